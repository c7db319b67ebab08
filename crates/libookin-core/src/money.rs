use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const MINOR_UNIT_SCALE: u32 = 2;

pub fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_minor(amount * percent / Decimal::ONE_HUNDRED)
}

pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (round_minor(amount) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn from_minor_units(units: i64) -> Decimal {
    Decimal::new(units, MINOR_UNIT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_midpoint_up() {
        assert_eq!(round_minor(Decimal::new(2825, 3)), Decimal::new(283, 2));
        assert_eq!(round_minor(Decimal::new(2824, 3)), Decimal::new(282, 2));
        assert_eq!(round_minor(Decimal::new(1005, 3)), Decimal::new(101, 2));
    }

    #[test]
    fn percent_of_rounds_result() {
        assert_eq!(
            percent_of(Decimal::new(499, 2), Decimal::from(75)),
            Decimal::new(374, 2)
        );
        assert_eq!(
            percent_of(Decimal::new(299, 2), Decimal::from(75)),
            Decimal::new(224, 2)
        );
        assert_eq!(
            percent_of(Decimal::new(99, 2), Decimal::from(50)),
            Decimal::new(50, 2)
        );
    }

    #[test]
    fn minor_units_conversion() {
        assert_eq!(to_minor_units(Decimal::new(1550, 2)), Some(1550));
        assert_eq!(to_minor_units(Decimal::new(15005, 3)), Some(1501));
        assert_eq!(from_minor_units(1234), Decimal::new(1234, 2));
    }
}
