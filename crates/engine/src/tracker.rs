use std::collections::HashMap;

use common::{LoopSignal, OpenOrder, OrderKind, StopReason, TrackedOrder};

/// The open-order set reduced to what the loop acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Track(TrackedOrder),
    Stop(StopReason),
}

impl Resolution {
    pub fn signal(&self) -> LoopSignal {
        match self {
            Resolution::Track(_) => LoopSignal::Continue,
            Resolution::Stop(reason) => (*reason).into(),
        }
    }

    pub fn tracked(&self) -> Option<&TrackedOrder> {
        match self {
            Resolution::Track(order) => Some(order),
            Resolution::Stop(_) => None,
        }
    }
}

/// Reduce the exchange's open orders to the single managed order.
///
/// Only one position is ever managed: an empty set or more than one open
/// order is terminal, never a guess.
pub fn resolve(open_orders: &HashMap<String, OpenOrder>) -> Resolution {
    let mut entries = open_orders.iter();
    match (entries.next(), entries.next()) {
        (None, _) => Resolution::Stop(StopReason::NoOpenOrders),
        (Some(_), Some(_)) => Resolution::Stop(StopReason::MultipleOpenOrders),
        (Some((id, order)), None) => Resolution::Track(TrackedOrder {
            id: id.clone(),
            kind: OrderKind::from_exchange(&order.order_type),
            side: order.side,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderSide;

    fn order(order_type: &str) -> OpenOrder {
        OpenOrder {
            pair: "XETHZUSD".into(),
            side: OrderSide::Sell,
            order_type: order_type.into(),
            price: Some("1900".into()),
            volume: "1.5".into(),
        }
    }

    fn orders(entries: &[(&str, &str)]) -> HashMap<String, OpenOrder> {
        entries
            .iter()
            .map(|(id, ty)| (id.to_string(), order(ty)))
            .collect()
    }

    #[test]
    fn empty_set_means_no_open_orders() {
        let resolution = resolve(&HashMap::new());
        assert_eq!(resolution, Resolution::Stop(StopReason::NoOpenOrders));
        assert_eq!(resolution.signal(), LoopSignal::NoOpenOrders);
        assert!(resolution.tracked().is_none());
    }

    #[test]
    fn two_or_more_orders_are_refused() {
        for set in [
            orders(&[("A", "stop-loss"), ("B", "take-profit")]),
            orders(&[("A", "limit"), ("B", "limit"), ("C", "stop-loss")]),
        ] {
            let resolution = resolve(&set);
            assert_eq!(resolution.signal(), LoopSignal::MultipleOpenOrders);
            assert!(resolution.tracked().is_none());
        }
    }

    #[test]
    fn single_order_is_tracked_with_normalized_kind() {
        let cases = [
            ("limit", OrderKind::Limit),
            ("stop-loss", OrderKind::StopLoss),
            ("take-profit", OrderKind::TakeProfit),
            ("Take-Profit", OrderKind::Other),
            ("trailing-stop", OrderKind::Other),
        ];
        for (raw, kind) in cases {
            let resolution = resolve(&orders(&[("OQCLML-BW3P3-BUCMWZ", raw)]));
            assert_eq!(resolution.signal(), LoopSignal::Continue);
            assert_eq!(
                resolution.tracked(),
                Some(&TrackedOrder {
                    id: "OQCLML-BW3P3-BUCMWZ".into(),
                    kind,
                    side: OrderSide::Sell,
                }),
                "{raw}"
            );
        }
    }
}
