use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use common::{Error, ExchangeClient, FlipRequest, NewOrder, OrderAck, OrderKind};

use crate::bounded::bounded;

/// Failure stage of a flip. Everything except `Unprotected` happens before
/// the protective order is touched.
#[derive(Debug, Error)]
pub enum FlipError {
    #[error("cannot place a {0} order as a protective replacement")]
    UnsupportedTarget(OrderKind),

    #[error("balance query failed: {0}")]
    Balance(#[source] Error),

    #[error("nothing to sell: {asset} balance is {balance}")]
    NothingToSell { asset: String, balance: String },

    #[error("cancel of order {order_id} failed: {source}")]
    Cancel {
        order_id: String,
        #[source]
        source: Error,
    },

    #[error("cancel of order {order_id} not confirmed (count {count}, pending {pending})")]
    CancelUnconfirmed {
        order_id: String,
        count: u32,
        pending: bool,
    },

    #[error("order {cancelled_order} cancelled but {target} replacement failed: {source}")]
    Unprotected {
        cancelled_order: String,
        target: OrderKind,
        #[source]
        source: Error,
    },
}

impl FlipError {
    /// True when the position was left without any protective order.
    pub fn is_unprotected(&self) -> bool {
        matches!(self, FlipError::Unprotected { .. })
    }
}

/// Result of a completed flip.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipReceipt {
    pub cancelled_order: String,
    pub placed: OrderAck,
    pub volume: String,
}

/// Performs the cancel-then-place transition. No retries, no rollback.
///
/// Volume is always the full base asset balance.
pub struct TransitionExecutor {
    client: Arc<dyn ExchangeClient>,
    base_asset: String,
    settle_delay: Duration,
    call_timeout: Duration,
}

impl TransitionExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        base_asset: impl Into<String>,
        settle_delay: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_asset: base_asset.into(),
            settle_delay,
            call_timeout,
        }
    }

    pub async fn execute(
        &self,
        order_id: &str,
        request: &FlipRequest,
    ) -> Result<FlipReceipt, FlipError> {
        if !request.target.is_protective() {
            return Err(FlipError::UnsupportedTarget(request.target));
        }

        let volume = self.sellable_volume().await?;

        let ack = bounded("cancel_order", self.call_timeout, self.client.cancel_order(order_id))
            .await
            .map_err(|source| FlipError::Cancel {
                order_id: order_id.to_string(),
                source,
            })?;
        if !ack.is_confirmed() {
            return Err(FlipError::CancelUnconfirmed {
                order_id: order_id.to_string(),
                count: ack.count,
                pending: ack.pending,
            });
        }
        info!(order_id, "Protective order cancelled");

        // Cancellations are applied asynchronously on the exchange side.
        debug!(delay = ?self.settle_delay, "Waiting for cancellation to settle");
        tokio::time::sleep(self.settle_delay).await;

        let order = NewOrder {
            pair: request.pair.clone(),
            side: request.side,
            kind: request.target,
            volume: volume.clone(),
            price: request.trigger,
        };
        let placed = bounded("add_order", self.call_timeout, self.client.add_order(&order))
            .await
            .map_err(|source| FlipError::Unprotected {
                cancelled_order: order_id.to_string(),
                target: request.target,
                source,
            })?;
        info!(
            pair = %order.pair,
            kind = %order.kind,
            price = order.price,
            volume = %order.volume,
            txids = ?placed.txids,
            "Replacement order placed"
        );

        Ok(FlipReceipt {
            cancelled_order: order_id.to_string(),
            placed,
            volume,
        })
    }

    /// The whole base asset balance, as reported by the exchange.
    async fn sellable_volume(&self) -> Result<String, FlipError> {
        let balances = bounded("balance", self.call_timeout, self.client.balance())
            .await
            .map_err(FlipError::Balance)?;

        let raw = balances
            .get(&self.base_asset)
            .map(|v| v.trim().to_string())
            .ok_or_else(|| FlipError::NothingToSell {
                asset: self.base_asset.clone(),
                balance: "missing".into(),
            })?;
        let amount = raw.parse::<f64>().map_err(|e| {
            FlipError::Balance(Error::Exchange(format!(
                "{} balance '{raw}' is not a decimal: {e}",
                self.base_asset
            )))
        })?;
        if !(amount.is_finite() && amount > 0.0) {
            return Err(FlipError::NothingToSell {
                asset: self.base_asset.clone(),
                balance: raw,
            });
        }
        Ok(raw)
    }
}
