use serde::{Deserialize, Serialize};

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Parse Kraken's `type` field of an order description.
    pub fn from_exchange(raw: &str) -> Option<Self> {
        match raw {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type as far as the flip strategy cares.
///
/// Anything the exchange reports that is not one of the three managed types
/// is `Other` and is never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    StopLoss,
    TakeProfit,
    Other,
}

impl OrderKind {
    /// Normalize the exchange's raw order type string. Case-sensitive.
    pub fn from_exchange(raw: &str) -> Self {
        match raw {
            "limit" => OrderKind::Limit,
            "stop-loss" => OrderKind::StopLoss,
            "take-profit" => OrderKind::TakeProfit,
            _ => OrderKind::Other,
        }
    }

    /// Wire name for order placement. `Other` has none.
    pub fn as_exchange_str(&self) -> Option<&'static str> {
        match self {
            OrderKind::Limit => Some("limit"),
            OrderKind::StopLoss => Some("stop-loss"),
            OrderKind::TakeProfit => Some("take-profit"),
            OrderKind::Other => None,
        }
    }

    /// True for the two kinds the engine flips between.
    pub fn is_protective(&self) -> bool {
        matches!(self, OrderKind::StopLoss | OrderKind::TakeProfit)
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_exchange_str().unwrap_or("other"))
    }
}

/// One entry of the exchange's open-order set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub pair: String,
    pub side: OrderSide,
    /// Raw order type as reported by the exchange, e.g. `"stop-loss"`.
    pub order_type: String,
    /// Primary price (trigger price for stop-loss / take-profit).
    pub price: Option<String>,
    pub volume: String,
}

/// Latest ticker snapshot. Only the close array is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub pair: String,
    /// `[last trade price, lot volume]` as decimal strings.
    pub close: Vec<String>,
}

/// Exchange acknowledgement of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    /// Number of orders cancelled.
    pub count: u32,
    /// True if the cancellation is still pending on the exchange side.
    pub pending: bool,
}

impl CancelAck {
    pub fn is_confirmed(&self) -> bool {
        self.count > 0
    }
}

/// An order to be placed on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub pair: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Volume in base asset units, passed through verbatim from the balance.
    pub volume: String,
    /// Limit or trigger price.
    pub price: f64,
}

/// Exchange acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub txids: Vec<String>,
    pub description: String,
}

/// The single order managed during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    pub id: String,
    pub kind: OrderKind,
    pub side: OrderSide,
}

/// Replacement order proposed by the decision engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipRequest {
    /// Always `StopLoss` or `TakeProfit`.
    pub target: OrderKind,
    pub trigger: f64,
    pub pair: String,
    pub side: OrderSide,
}

/// Why the poll loop stopped managing the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    NoOpenOrders,
    MultipleOpenOrders,
    /// Shutdown requested by the operator, honoured between ticks.
    Interrupted,
}

impl StopReason {
    /// Process exit code reported to the supervisor.
    pub fn exit_code(&self) -> u8 {
        match self {
            StopReason::NoOpenOrders => 3,
            StopReason::MultipleOpenOrders => 4,
            StopReason::Interrupted => 130,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::NoOpenOrders => write!(f, "no open orders"),
            StopReason::MultipleOpenOrders => write!(f, "multiple open orders"),
            StopReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Continue,
    NoOpenOrders,
    MultipleOpenOrders,
    Interrupted,
}

impl From<StopReason> for LoopSignal {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::NoOpenOrders => LoopSignal::NoOpenOrders,
            StopReason::MultipleOpenOrders => LoopSignal::MultipleOpenOrders,
            StopReason::Interrupted => LoopSignal::Interrupted,
        }
    }
}

impl LoopSignal {
    /// `None` while the loop should keep running.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            LoopSignal::Continue => None,
            LoopSignal::NoOpenOrders => Some(StopReason::NoOpenOrders),
            LoopSignal::MultipleOpenOrders => Some(StopReason::MultipleOpenOrders),
            LoopSignal::Interrupted => Some(StopReason::Interrupted),
        }
    }
}

/// Current state of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Running,
    Stopped(StopReason),
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Running => write!(f, "running"),
            LoopState::Stopped(reason) => write!(f, "stopped ({reason})"),
        }
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Events published by the poll loop for operator alerting.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    OrderFlipped {
        pair: String,
        cancelled_order: String,
        from: OrderKind,
        to: OrderKind,
        trigger: f64,
        volume: String,
    },
    /// The flip was aborted before the protective order was cancelled.
    FlipFailed { pair: String, error: String },
    /// The protective order was cancelled but its replacement was not placed.
    PositionUnprotected {
        pair: String,
        cancelled_order: String,
        error: String,
    },
    Stopped(StopReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_kind_normalization_is_case_sensitive() {
        assert_eq!(OrderKind::from_exchange("limit"), OrderKind::Limit);
        assert_eq!(OrderKind::from_exchange("stop-loss"), OrderKind::StopLoss);
        assert_eq!(OrderKind::from_exchange("take-profit"), OrderKind::TakeProfit);
        assert_eq!(OrderKind::from_exchange("Stop-Loss"), OrderKind::Other);
        assert_eq!(OrderKind::from_exchange("LIMIT"), OrderKind::Other);
    }

    #[test]
    fn unknown_order_types_map_to_other() {
        for raw in ["market", "stop-loss-limit", "take-profit-limit", "trailing-stop", ""] {
            assert_eq!(OrderKind::from_exchange(raw), OrderKind::Other, "{raw}");
        }
    }

    #[test]
    fn only_stop_loss_and_take_profit_are_protective() {
        assert!(OrderKind::StopLoss.is_protective());
        assert!(OrderKind::TakeProfit.is_protective());
        assert!(!OrderKind::Limit.is_protective());
        assert!(!OrderKind::Other.is_protective());
    }

    #[test]
    fn stop_reasons_have_distinct_nonzero_exit_codes() {
        assert_eq!(StopReason::NoOpenOrders.exit_code(), 3);
        assert_eq!(StopReason::MultipleOpenOrders.exit_code(), 4);
        assert_eq!(StopReason::Interrupted.exit_code(), 130);
    }

    #[test]
    fn loop_signal_maps_back_to_stop_reason() {
        assert_eq!(LoopSignal::Continue.stop_reason(), None);
        for reason in [
            StopReason::NoOpenOrders,
            StopReason::MultipleOpenOrders,
            StopReason::Interrupted,
        ] {
            assert_eq!(LoopSignal::from(reason).stop_reason(), Some(reason));
        }
    }
}
