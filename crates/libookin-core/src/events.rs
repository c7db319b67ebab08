use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ItemId, PayeeId, SaleId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promo {
    pub discount_percent: Decimal,
    pub ends_on: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLine {
    pub item_id: ItemId,
    pub payee_id: PayeeId,
    pub net_price_before_tax: Decimal,
    #[serde(default)]
    pub promo: Option<Promo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleCompleted {
    pub sale_id: SaleId,
    pub sale_date: NaiveDate,
    pub items: Vec<SaleLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PayoutCommand {
    TriggerPayout,
    CancelBatch {
        #[serde(default)]
        batch_id: Option<Uuid>,
    },
}
