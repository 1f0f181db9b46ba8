use std::collections::HashMap;

use async_trait::async_trait;

use crate::{CancelAck, NewOrder, OpenOrder, OrderAck, Result, Ticker};

/// Abstraction over the exchange connection.
///
/// `KrakenClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Implementations should bound their own network calls; the engine
/// additionally wraps every call in a timeout.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Currently open orders, keyed by order id.
    async fn open_orders(&self) -> Result<HashMap<String, OpenOrder>>;

    /// Public ticker for a trading pair.
    async fn ticker(&self, pair: &str) -> Result<Ticker>;

    /// Account balances as decimal strings, keyed by asset code.
    async fn balance(&self) -> Result<HashMap<String, String>>;

    /// Cancel an open order by id.
    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck>;

    /// Place a new order.
    async fn add_order(&self, order: &NewOrder) -> Result<OrderAck>;
}
