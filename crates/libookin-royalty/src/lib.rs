use chrono::NaiveDate;
use libookin_core::money::{percent_of, round_minor};
use libookin_core::{ItemId, NewRoyaltyEntry, PayeeId, Promo, SaleId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RoyaltyError {
    #[error("net price must not be negative, got {0}")]
    NegativePrice(Decimal),

    #[error("promo discount must be between 0 and 100, got {0}")]
    InvalidDiscount(Decimal),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoyaltyDraft {
    pub net_price: Decimal,
    pub royalty_percent: Decimal,
    pub royalty_amount: Decimal,
    pub promo_applied: bool,
}

impl RoyaltyDraft {
    pub fn into_entry(self, sale_id: SaleId, item_id: ItemId, payee_id: PayeeId) -> NewRoyaltyEntry {
        NewRoyaltyEntry {
            sale_id,
            item_id,
            payee_id,
            net_price: self.net_price,
            royalty_percent: self.royalty_percent,
            promo_applied: self.promo_applied,
        }
    }
}

fn brackets() -> [(Decimal, Decimal); 4] {
    [
        (Decimal::new(283, 2), Decimal::from(50)),
        (Decimal::new(473, 2), Decimal::from(75)),
        (Decimal::new(947, 2), Decimal::from(80)),
        (Decimal::new(1421, 2), Decimal::from(70)),
    ]
}

fn top_bracket_percent() -> Decimal {
    Decimal::from(50)
}

/// Tiered royalty percent for a post-promo net price. A price equal to a
/// bracket boundary falls in the bracket that starts there.
pub fn royalty_percent(net_price: Decimal) -> Decimal {
    brackets()
        .into_iter()
        .find(|(upper, _)| net_price < *upper)
        .map(|(_, percent)| percent)
        .unwrap_or_else(top_bracket_percent)
}

pub fn apply_promo(
    net_price: Decimal,
    promo: Option<&Promo>,
    sale_date: NaiveDate,
) -> Result<(Decimal, bool), RoyaltyError> {
    let Some(promo) = promo else {
        return Ok((net_price, false));
    };

    if promo.discount_percent < Decimal::ZERO || promo.discount_percent > Decimal::ONE_HUNDRED {
        return Err(RoyaltyError::InvalidDiscount(promo.discount_percent));
    }

    if promo.discount_percent > Decimal::ZERO && sale_date <= promo.ends_on {
        let discounted =
            net_price * (Decimal::ONE_HUNDRED - promo.discount_percent) / Decimal::ONE_HUNDRED;
        return Ok((discounted, true));
    }

    Ok((net_price, false))
}

pub fn compute_royalty(
    net_price_before_promo: Decimal,
    promo: Option<&Promo>,
    sale_date: NaiveDate,
) -> Result<RoyaltyDraft, RoyaltyError> {
    if net_price_before_promo < Decimal::ZERO {
        return Err(RoyaltyError::NegativePrice(net_price_before_promo));
    }

    let (discounted, promo_applied) = apply_promo(net_price_before_promo, promo, sale_date)?;
    let net_price = round_minor(discounted);
    let royalty_percent = royalty_percent(net_price);

    Ok(RoyaltyDraft {
        net_price,
        royalty_percent,
        royalty_amount: percent_of(net_price, royalty_percent),
        promo_applied,
    })
}
