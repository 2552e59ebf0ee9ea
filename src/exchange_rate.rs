use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// Buy/sell quote for a single day, as published by the indicators API.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRate {
    pub date: NaiveDate,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
}

/// Row written to the rate table: the quote plus who/when bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditedRateRecord {
    pub date: NaiveDate,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub created_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
    pub created_by: String,
    pub modified_by: String,
    pub created_by_ip: String,
    pub modified_by_ip: String,
    pub created_by_host: String,
    pub modified_by_host: String,
    pub monthly_reference_price: Decimal,
    pub reference_price: Decimal,
}

/// Where a run originates from, recorded in the host/IP audit columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Origin {
    pub host: String,
    pub ip: String,
}

impl AuditedRateRecord {
    /// Both reference prices carry the buy price, and the modifier columns
    /// mirror the creator columns since rows are only ever inserted.
    pub fn new(rate: &ExchangeRate, user: &str, origin: &Origin, now: NaiveDateTime) -> Self {
        Self {
            date: rate.date,
            buy_price: rate.buy_price,
            sell_price: rate.sell_price,
            created_at: now,
            modified_at: now,
            created_by: user.to_string(),
            modified_by: user.to_string(),
            created_by_ip: origin.ip.clone(),
            modified_by_ip: origin.ip.clone(),
            created_by_host: origin.host.clone(),
            modified_by_host: origin.host.clone(),
            monthly_reference_price: rate.buy_price,
            reference_price: rate.buy_price,
        }
    }
}
