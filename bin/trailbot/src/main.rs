//! Trailing exit bot: keeps one Kraken position protected by flipping its
//! sell order between stop-loss and take-profit.
//!
//! Exit codes:
//! - `2`: configuration error, the loop never started
//! - `3`: no open orders left to manage
//! - `4`: more than one open order, refusing to guess
//! - `130`: interrupted by the operator

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    Config, EngineEvent, ExchangeClient, OrderKind, PositionConfig, PositionFile, Result,
    TradingMode,
};
use engine::{KrakenClient, LoopTiming, PollLoop};
use paper::PaperClient;

const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let (cfg, position_file, position) = match load_config() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "Startup aborted");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(mode = %cfg.trading_mode, pair = %position.pair, "Trailbot starting");

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange_client = match build_client(&cfg, &position_file, &position).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Startup aborted");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // ── Alert forwarder ───────────────────────────────────────────────────────
    let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(64);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                EngineEvent::OrderFlipped {
                    pair,
                    cancelled_order,
                    from,
                    to,
                    trigger,
                    volume,
                } => {
                    info!(target: "alert", %pair, %cancelled_order, %from, %to, trigger, %volume, "Order flipped");
                }
                EngineEvent::FlipFailed { pair, error } => {
                    warn!(target: "alert", %pair, %error, "Flip failed, previous order still active");
                }
                EngineEvent::PositionUnprotected {
                    pair,
                    cancelled_order,
                    error,
                } => {
                    error!(
                        target: "alert",
                        %pair,
                        %cancelled_order,
                        %error,
                        "Position has NO protective order. Manual intervention required."
                    );
                }
                EngineEvent::Stopped(reason) => {
                    warn!(target: "alert", %reason, "Strategy no longer managing the position");
                }
            }
        }
    });

    // ── Poll loop ─────────────────────────────────────────────────────────────
    let timing = LoopTiming {
        poll_interval: position_file.poll_interval(),
        settle_delay: position_file.settle_delay(),
        call_timeout: cfg.request_timeout,
    };
    let poll_loop = PollLoop::new(exchange_client, position, timing, event_tx);

    // ── Shutdown (honoured between ticks, never mid-flip) ─────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, finishing the current tick");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    let reason = poll_loop.run(shutdown_rx).await;
    warn!(%reason, code = reason.exit_code(), "Exiting");
    ExitCode::from(reason.exit_code())
}

fn load_config() -> Result<(Config, PositionFile, PositionConfig)> {
    let cfg = Config::from_env()?;
    let position_file = PositionFile::load(&cfg.position_config_path)?;
    let position = position_file.position()?;
    Ok((cfg, position_file, position))
}

async fn build_client(
    cfg: &Config,
    position_file: &PositionFile,
    position: &PositionConfig,
) -> Result<Arc<dyn ExchangeClient>> {
    match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using KrakenClient");
            let client =
                KrakenClient::new(&cfg.kraken_api_key, &cfg.kraken_secret, cfg.request_timeout)?;
            Ok(Arc::new(client))
        }
        TradingMode::Paper => {
            info!(volume = cfg.paper_volume, "Paper trading mode, using PaperClient");
            let market = Arc::new(KrakenClient::public(cfg.request_timeout)?);
            let client = PaperClient::new(
                market,
                &position_file.currency.base,
                &position_file.currency.quote,
                cfg.paper_volume,
            );
            let ack = client
                .seed_protective_order(&position.pair, OrderKind::StopLoss, position.stop)
                .await?;
            info!(txids = ?ack.txids, stop = position.stop, "Seeded paper stop-loss");
            Ok(Arc::new(client))
        }
    }
}
