use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use common::{Error, ExchangeClient, Result, Ticker};

use crate::bounded::bounded;

/// Last traded price of a pair, fetched fresh on every call.
pub struct PriceOracle {
    client: Arc<dyn ExchangeClient>,
    call_timeout: Duration,
}

impl PriceOracle {
    pub fn new(client: Arc<dyn ExchangeClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// Every failure is reported as `Error::PriceUnavailable`.
    pub async fn last_price(&self, pair: &str) -> Result<f64> {
        let ticker = bounded("ticker", self.call_timeout, self.client.ticker(pair))
            .await
            .map_err(|e| unavailable(pair, e.to_string()))?;
        let price = parse_last_price(&ticker)?;
        debug!(pair, price, "Last price");
        Ok(price)
    }
}

/// First element of the ticker's close array as a finite decimal.
pub fn parse_last_price(ticker: &Ticker) -> Result<f64> {
    let raw = ticker
        .close
        .first()
        .ok_or_else(|| unavailable(&ticker.pair, "ticker has no close price".into()))?;
    let price = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| unavailable(&ticker.pair, format!("'{raw}' is not a decimal: {e}")))?;
    if !price.is_finite() {
        return Err(unavailable(&ticker.pair, format!("'{raw}' is not a finite price")));
    }
    Ok(price)
}

fn unavailable(pair: &str, reason: String) -> Error {
    Error::PriceUnavailable {
        pair: pair.to_string(),
        reason,
    }
}
