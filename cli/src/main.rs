pub mod cli;

use std::sync::Arc;

use adapters::signal::{SignalApi, SignalHttpClient, SignalWsConnector};
use clap::Parser;
use common::logger::{LogFormat, init_logger};
use feed::{SyncConfig, SyncEvent, SyncRunner, Visibility};
use serde::Serialize;
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{info, warn};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::from_env()
    };
    init_logger("signal-dashboard", format);

    let config = cli.apply_overrides(SyncConfig::from_env());
    let http = SignalHttpClient::new(&config.api_url)?;

    match cli.command.unwrap_or_default() {
        Commands::Run => run(config, http).await,
        Commands::Signal => print_json(&http.fetch_signal().await?),
        Commands::History => print_json(&http.fetch_history().await?),
        Commands::Performance => print_json(&http.fetch_performance().await?),
        Commands::Advanced => print_json(&http.fetch_advanced_signal().await?),
        Commands::MultiTimeframe => print_json(&http.fetch_multi_timeframe().await?),
        Commands::PositionSize => print_json(&http.fetch_position_size().await?),
        Commands::TestAlert => print_json(&http.send_test_alert().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Headless dashboard: keep the feed synced and log what a screen would show.
async fn run(config: SyncConfig, http: SignalHttpClient) -> anyhow::Result<()> {
    info!(api = %config.api_url, ws = %config.ws_url, "Starting signal dashboard...");

    let http = Arc::new(http);
    let ws = Arc::new(SignalWsConnector::new(config.ws_url.clone()));

    // No window manager here; the host is always visible.
    let (_visibility, visibility_rx) = watch::channel(Visibility::Visible);

    let (runner, handle) = SyncRunner::new(&config, http.clone(), ws, http, visibility_rx);
    let mut events = handle.subscribe();
    let task = runner.spawn();

    handle.start().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => render(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "renderer fell behind"),
                Err(RecvError::Closed) => break,
            },
            res = &mut shutdown => {
                res?;
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "sync runner already gone");
    }
    task.await?;

    Ok(())
}

fn render(event: &SyncEvent) {
    match event {
        SyncEvent::Snapshot { snapshot, change } => {
            let change = change
                .map(|c| format!("{:+.2}%", c.signed_ratio() * 100.0))
                .unwrap_or_else(|| "n/a".to_string());

            info!(
                signal = %snapshot.signal,
                binance = snapshot.binance_price,
                dex = snapshot.dex_price,
                spread = snapshot.spread,
                rsi = snapshot.rsi,
                ema = snapshot.ema,
                change = %change,
                ts = %snapshot.timestamp,
                "signal update"
            );
        }
        SyncEvent::History(history) => {
            info!(
                entries = history.len(),
                latest = ?history.first().map(|s| s.signal),
                "history refreshed"
            );
        }
        SyncEvent::Performance(report) => {
            let metrics = report.metrics.clone().unwrap_or_default();
            info!(
                win_rate = ?metrics.win_rate,
                pnl = ?metrics.total_profit_loss,
                trades = ?metrics.total_trades,
                sharpe = ?metrics.sharpe_ratio,
                balance = ?metrics.current_balance,
                "performance refreshed"
            );
        }
        SyncEvent::Advanced(advanced) => {
            info!(
                strength = ?advanced.signal_strength,
                confidence = ?advanced.confidence_score,
                volatility = ?advanced.volatility,
                position_size = ?advanced.position_size,
                timeframes = ?advanced.timeframe_data.keys().collect::<Vec<_>>(),
                "advanced analysis refreshed"
            );
        }
        SyncEvent::Connection(state) => info!(?state, "connection"),
        SyncEvent::Fallback(true) => warn!("live channel down; using polling"),
        SyncEvent::Fallback(false) => info!("live updates restored"),
        SyncEvent::Transition(snapshot) => {
            info!(signal = %snapshot.signal, price = snapshot.binance_price, "signal changed");
        }
        SyncEvent::AlertSent { signal, success } => {
            if *success {
                info!(%signal, "alert sent");
            } else {
                warn!(%signal, "alert not delivered");
            }
        }
    }
}
