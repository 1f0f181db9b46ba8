use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, TradingMode};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (empty in paper mode)
    pub kraken_api_key: String,
    pub kraken_secret: String,

    // Trading
    pub trading_mode: TradingMode,
    /// Base asset volume of the simulated position in paper mode.
    pub paper_volume: f64,

    // Exchange calls
    pub request_timeout: Duration,

    // Position file path
    pub position_config_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let trading_mode = match lookup("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let (kraken_api_key, kraken_secret) = match trading_mode {
            TradingMode::Live => (
                required(&lookup, "KRAKEN_API_KEY")?,
                required(&lookup, "KRAKEN_SECRET")?,
            ),
            TradingMode::Paper => (
                lookup("KRAKEN_API_KEY").unwrap_or_default(),
                lookup("KRAKEN_SECRET").unwrap_or_default(),
            ),
        };

        let request_timeout_secs: u64 = parsed(&lookup, "REQUEST_TIMEOUT_SECS")?.unwrap_or(10);
        if request_timeout_secs == 0 {
            return Err(Error::Config("REQUEST_TIMEOUT_SECS must be positive".into()));
        }

        let paper_volume: f64 = parsed(&lookup, "PAPER_VOLUME")?.unwrap_or(1.0);
        if !(paper_volume.is_finite() && paper_volume > 0.0) {
            return Err(Error::Config(format!(
                "PAPER_VOLUME must be a positive number, got {paper_volume}"
            )));
        }

        Ok(Config {
            kraken_api_key,
            kraken_secret,
            trading_mode,
            paper_volume,
            request_timeout: Duration::from_secs(request_timeout_secs),
            position_config_path: lookup("POSITION_CONFIG_PATH")
                .unwrap_or_else(|| "config/position.toml".to_string()),
        })
    }
}

fn required<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Result<String> {
    lookup(key).filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key} is invalid ('{v}'): {e}")))
        })
        .transpose()
}

/// Position file (TOML).
///
/// Example `config/position.toml`:
/// ```toml
/// poll_interval_secs = 10
/// settle_delay_ms = 1000
///
/// [currency]
/// base = "XETH"
/// quote = "ZUSD"
///
/// [order]
/// entry = 2000.0
/// stop = 1900.0
/// take = 2200.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionFile {
    pub currency: CurrencyConfig,
    pub order: OrderThresholds,
    /// Seconds to wait before every tick.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Milliseconds to wait between cancel and place.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurrencyConfig {
    /// Base asset code as used in the balance response, e.g. "XETH".
    pub base: String,
    /// Quote asset code, e.g. "ZUSD".
    pub quote: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct OrderThresholds {
    pub entry: f64,
    pub stop: f64,
    pub take: f64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl PositionFile {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read position config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse position config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: PositionFile = toml::from_str(content)?;
        file.position()?;
        if file.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }
        Ok(file)
    }

    /// The validated position the engine manages.
    pub fn position(&self) -> Result<PositionConfig> {
        let CurrencyConfig { base, quote } = &self.currency;
        if base.is_empty() || quote.is_empty() {
            return Err(Error::Config("currency base and quote must be set".into()));
        }

        let OrderThresholds { entry, stop, take } = self.order;
        for (name, value) in [("entry", entry), ("stop", stop), ("take", take)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "order.{name} must be a positive number, got {value}"
                )));
            }
        }
        if !(stop < entry && entry < take) {
            warn!(entry, stop, take, "Thresholds are not ordered stop < entry < take");
        }

        Ok(PositionConfig {
            pair: format!("{base}{quote}"),
            base_asset: base.clone(),
            entry,
            stop,
            take,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Immutable description of the protected position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionConfig {
    /// Trading pair, base + quote, e.g. "XETHZUSD".
    pub pair: String,
    /// Balance key of the asset sold on a flip.
    pub base_asset: String,
    pub entry: f64,
    pub stop: f64,
    pub take: f64,
}
