use common::{FlipRequest, OrderKind, OrderSide, PositionConfig};

/// Decide whether the tracked order should be flipped at `current_price`.
///
/// Stateless: the answer depends only on the order kind and the price.
/// Price exactly at entry never flips.
pub fn decide(kind: OrderKind, current_price: f64, position: &PositionConfig) -> Option<FlipRequest> {
    let (target, trigger) = match kind {
        // Entry orders awaiting fill.
        OrderKind::Limit => return None,
        OrderKind::Other => return None,
        OrderKind::StopLoss if current_price > position.entry => {
            (OrderKind::TakeProfit, position.take)
        }
        OrderKind::TakeProfit if current_price < position.entry => {
            (OrderKind::StopLoss, position.stop)
        }
        OrderKind::StopLoss | OrderKind::TakeProfit => return None,
    };

    Some(FlipRequest {
        target,
        trigger,
        pair: position.pair.clone(),
        side: OrderSide::Sell,
    })
}
