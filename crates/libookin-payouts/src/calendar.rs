//! Payout-day policy and the date arithmetic behind eligibility windows.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc, Weekday};

/// A payout day is the 1st of the month when it is a weekday, otherwise the
/// Monday right after a weekend 1st (the 2nd or the 3rd).
pub fn is_payout_day(date: NaiveDate) -> bool {
    let first_weekday = date.with_day(1).map(|first| first.weekday());
    match date.day() {
        1 => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        2 => first_weekday == Some(Weekday::Sun),
        3 => first_weekday == Some(Weekday::Sat),
        _ => false,
    }
}

pub fn next_payout_date(today: NaiveDate) -> NaiveDate {
    today
        .iter_days()
        .skip(1)
        .find(|date| is_payout_day(*date))
        .unwrap_or(today)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Exclusive creation-time bound of eligible entries. Entries created on or
/// before the last day of the month `window_months_ago` months before `now`
/// are eligible, so the bound is midnight UTC of the following month's 1st.
pub fn eligibility_cutoff(now: DateTime<Utc>, window_months_ago: u32) -> DateTime<Utc> {
    let first = first_of_month(now.date_naive());
    let bound = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.checked_sub_months(Months::new(window_months_ago)))
        .unwrap_or(first);
    bound.and_time(chrono::NaiveTime::MIN).and_utc()
}

pub fn settlement_period(today: NaiveDate, months: u32) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_months(Months::new(months))
        .unwrap_or(today);
    (start, today)
}

pub fn start_of_year(today: NaiveDate) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(today.year(), 1, 1)
        .unwrap_or(today)
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
}
