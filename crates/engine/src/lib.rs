mod bounded;

pub mod decision;
pub mod executor;
pub mod kraken;
pub mod lifecycle;
pub mod oracle;
pub mod tracker;

pub use decision::decide;
pub use executor::{FlipError, FlipReceipt, TransitionExecutor};
pub use kraken::KrakenClient;
pub use lifecycle::{LoopTiming, PollLoop};
pub use oracle::PriceOracle;
pub use tracker::{resolve, Resolution};
