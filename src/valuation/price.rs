//! SOL/USD price quote

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ValuationConfig;
use crate::error::{Error, Result};

/// Source of the current SOL price in USD
#[async_trait]
pub trait PriceQuote: Send + Sync {
    async fn sol_usd(&self) -> Result<f64>;
}

/// `PriceQuote` over an HTTP endpoint returning one number
pub struct HttpPriceQuote {
    client: Client,
    url: String,
    field: String,
}

impl HttpPriceQuote {
    pub fn new(config: &ValuationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: config.price_url.clone(),
            field: config.price_field.clone(),
        })
    }

    async fn fetch_once(&self) -> Result<f64> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!("Price endpoint returned {}", status)));
        }

        let body: Value = response.json().await?;
        parse_quote(&body, &self.field)
            .ok_or_else(|| Error::Valuation(format!("No usable price in response: {}", body)))
    }
}

#[async_trait]
impl PriceQuote for HttpPriceQuote {
    async fn sol_usd(&self) -> Result<f64> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(1),
            max_elapsed_time: Some(Duration::from_secs(3)),
            ..Default::default()
        };

        let price = retry(backoff, || async {
            match self.fetch_once().await {
                Ok(price) => Ok(price),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable price quote error: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        debug!("SOL/USD quote: {}", price);
        Ok(price)
    }
}

/// Accepts a bare number, a numeric string, or an object holding either under `field`
pub fn parse_quote(body: &Value, field: &str) -> Option<f64> {
    let value = match body {
        Value::Object(map) => map.get(field)?,
        other => other,
    };

    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    (price.is_finite() && price > 0.0).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quote_shapes() {
        assert_eq!(parse_quote(&json!(172.5), "solPrice"), Some(172.5));
        assert_eq!(parse_quote(&json!("98.1"), "solPrice"), Some(98.1));
        assert_eq!(parse_quote(&json!({"solPrice": 150}), "solPrice"), Some(150.0));
        assert_eq!(parse_quote(&json!({"solPrice": "150.25"}), "solPrice"), Some(150.25));
    }

    #[test]
    fn test_parse_quote_rejects_garbage() {
        assert_eq!(parse_quote(&json!({"price": 150}), "solPrice"), None);
        assert_eq!(parse_quote(&json!(-3.0), "solPrice"), None);
        assert_eq!(parse_quote(&json!(0), "solPrice"), None);
        assert_eq!(parse_quote(&json!([1, 2]), "solPrice"), None);
        assert_eq!(parse_quote(&json!("n/a"), "solPrice"), None);
    }
}
