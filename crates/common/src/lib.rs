pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{Config, PositionConfig, PositionFile};
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use types::*;
