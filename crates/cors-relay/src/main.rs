//! cors-relay: fetch a third-party URL on behalf of a browser and return it
//! with permissive CORS headers.

mod config;
mod cors;
mod error;
mod forward;
mod server;
mod stats;
#[cfg(test)]
mod test_support;

use std::time::Duration;

use config::RelayConfig;
use forward::{Forwarder, HttpFetcher};
use server::AppState;
use stats::RelayStats;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("RELAY_CONFIG").ok())
        .unwrap_or_else(|| "cors-relay.toml".to_string());

    let listen_override = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned());

    let mut config = RelayConfig::load(&config_path)?;
    if let Some(addr) = listen_override {
        config.server.listen_address = addr;
    }

    // tonic's gRPC exporter needs a reactor, so the runtime comes first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = relay_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            redirect = %config.upstream.redirect,
            timeout_secs = config.upstream.timeout_secs,
            otlp_export = tracing_guard.is_exporting(),
            "Starting cors-relay"
        );

        run(config).await
    })
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(Duration::from_secs(config.upstream.timeout_secs))?;
    let stats = RelayStats::new();
    let forwarder = Forwarder::new(fetcher, &config.upstream, stats.clone())?;

    let state = AppState {
        config,
        forwarder,
        stats,
    };

    server::run(state).await
}
