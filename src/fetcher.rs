use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use log::{debug, info};
use reqwest::Client;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::RunConfig;
use crate::dolar::{Quote, TipoCambio};
use crate::exchange_rate::ExchangeRate;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("BadStatus({0}): exchange-rate API answered with a non-success status")]
    BadStatus(u16),

    #[error("Timeout: exchange-rate API did not answer in time")]
    Timeout,

    #[error("NetworkError: {0}")]
    NetworkError(String),

    #[error("MalformedPayload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }
}

/// Anything that can produce today's quote for a run.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self, config: &RunConfig) -> Result<ExchangeRate, FetchError>;
}

/// Single-attempt HTTP client for the indicators endpoint.
pub struct RateFetcher {
    client: Client,
}

impl Default for RateFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RateFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// One GET bounded by `timeout`, covering connect through body read.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<ExchangeRate, FetchError> {
        info!("Connecting to the exchange-rate API at {url}...");
        let text = self.load_json(url, timeout).await?;
        let rate = parse_rate(&text, Local::now().date_naive())?;
        info!(
            "Exchange rate obtained - buy: {}, sell: {}",
            rate.buy_price, rate.sell_price
        );
        Ok(rate)
    }

    async fn load_json(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let text = resp.text().await?;
        debug!("API responded with {} bytes", text.len());

        Ok(text)
    }
}

#[async_trait]
impl RateSource for RateFetcher {
    async fn fetch_rate(&self, config: &RunConfig) -> Result<ExchangeRate, FetchError> {
        self.fetch(&config.api_url, config.timeout).await
    }
}

/// Decodes an API body into a rate for `date`. Either both prices come out
/// valid or nothing does.
pub fn parse_rate(text: &str, date: chrono::NaiveDate) -> Result<ExchangeRate, FetchError> {
    let tc: TipoCambio = serde_json::from_str(text)
        .map_err(|e| FetchError::MalformedPayload(format!("unexpected body shape: {e}")))?;

    let buy_price = quote_price(&tc.dollar.buy, "dolar.compra.valor")?;
    let sell_price = quote_price(&tc.dollar.sell, "dolar.venta.valor")?;

    Ok(ExchangeRate {
        date,
        buy_price,
        sell_price,
    })
}

fn quote_price(quote: &Quote, field: &str) -> Result<Decimal, FetchError> {
    let value = quote
        .value
        .to_decimal()
        .map_err(|e| FetchError::MalformedPayload(format!("{field} is not numeric: {e}")))?;
    if value <= Decimal::ZERO {
        return Err(FetchError::MalformedPayload(format!(
            "{field} must be positive, got {value}"
        )));
    }
    Ok(value)
}
