use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use common::{
    EngineEvent, ExchangeClient, LoopSignal, LoopState, OrderSide, PositionConfig, StopReason,
};

use crate::bounded::bounded;
use crate::decision::decide;
use crate::executor::TransitionExecutor;
use crate::oracle::PriceOracle;
use crate::tracker::{resolve, Resolution};

/// Timing knobs of the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    /// Wait before every tick.
    pub poll_interval: Duration,
    /// Wait between cancel and place.
    pub settle_delay: Duration,
    /// Upper bound on every exchange call.
    pub call_timeout: Duration,
}

/// Drives one protected position: fetch open orders, decide, flip.
///
/// Ticks never overlap; the next tick starts after the previous one
/// returned. Terminal conditions stop the loop for good.
pub struct PollLoop {
    client: Arc<dyn ExchangeClient>,
    position: PositionConfig,
    oracle: PriceOracle,
    executor: TransitionExecutor,
    timing: LoopTiming,
    event_tx: mpsc::Sender<EngineEvent>,
    state: LoopState,
}

impl PollLoop {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        position: PositionConfig,
        timing: LoopTiming,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let oracle = PriceOracle::new(client.clone(), timing.call_timeout);
        let executor = TransitionExecutor::new(
            client.clone(),
            position.base_asset.clone(),
            timing.settle_delay,
            timing.call_timeout,
        );
        Self {
            client,
            position,
            oracle,
            executor,
            timing,
            event_tx,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the position can no longer be managed or `shutdown`
    /// turns true. Shutdown is only observed between ticks, so a flip that
    /// already cancelled its order always gets to place the replacement.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> StopReason {
        info!(
            pair = %self.position.pair,
            entry = self.position.entry,
            stop = self.position.stop,
            take = self.position.take,
            interval = ?self.timing.poll_interval,
            "Poll loop running"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.timing.poll_interval) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Shutdown requested, leaving poll loop");
                    self.stop(StopReason::Interrupted);
                    return StopReason::Interrupted;
                }
            }
            if let Some(reason) = self.tick().await.stop_reason() {
                return reason;
            }
        }
    }

    /// One iteration. Recoverable errors are logged here and never escape.
    pub async fn tick(&mut self) -> LoopSignal {
        if let LoopState::Stopped(reason) = self.state {
            return reason.into();
        }

        let open_orders = match bounded(
            "open_orders",
            self.timing.call_timeout,
            self.client.open_orders(),
        )
        .await
        {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Fetching open orders failed");
                return LoopSignal::Continue;
            }
        };

        let tracked = match resolve(&open_orders) {
            Resolution::Track(order) => order,
            Resolution::Stop(reason) => {
                self.stop(reason);
                return reason.into();
            }
        };

        if !tracked.kind.is_protective() {
            debug!(order_id = %tracked.id, kind = %tracked.kind, "Order is not managed, skipping");
            return LoopSignal::Continue;
        }
        if tracked.side != OrderSide::Sell {
            debug!(order_id = %tracked.id, side = %tracked.side, "Protective order is not a sell, skipping");
            return LoopSignal::Continue;
        }

        let price = match self.oracle.last_price(&self.position.pair).await {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "Getting last price failed");
                return LoopSignal::Continue;
            }
        };

        let Some(request) = decide(tracked.kind, price, &self.position) else {
            debug!(order_id = %tracked.id, kind = %tracked.kind, price, "No flip needed");
            return LoopSignal::Continue;
        };

        info!(
            order_id = %tracked.id,
            from = %tracked.kind,
            to = %request.target,
            price,
            trigger = request.trigger,
            "Flipping protective order"
        );

        let outcome = self.executor.execute(&tracked.id, &request).await;
        match outcome {
            Ok(receipt) => {
                self.emit(EngineEvent::OrderFlipped {
                    pair: request.pair,
                    cancelled_order: receipt.cancelled_order,
                    from: tracked.kind,
                    to: request.target,
                    trigger: request.trigger,
                    volume: receipt.volume,
                });
            }
            Err(e) if e.is_unprotected() => {
                error!(
                    unprotected = true,
                    pair = %request.pair,
                    error = %e,
                    "POSITION UNPROTECTED: replacement order was not placed"
                );
                self.emit(EngineEvent::PositionUnprotected {
                    pair: request.pair,
                    cancelled_order: tracked.id,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                warn!(pair = %request.pair, error = %e, "Flip aborted, existing order kept");
                self.emit(EngineEvent::FlipFailed {
                    pair: request.pair,
                    error: e.to_string(),
                });
            }
        }

        LoopSignal::Continue
    }

    fn stop(&mut self, reason: StopReason) {
        warn!(%reason, "Poll loop stopped");
        self.state = LoopState::Stopped(reason);
        self.emit(EngineEvent::Stopped(reason));
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!(error = %e, "Engine event dropped");
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender means nobody can
/// ask any more, so it never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
