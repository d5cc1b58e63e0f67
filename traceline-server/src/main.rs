use std::collections::BTreeMap;

use anyhow::Context;
use traceline_server::{endpoints, Config, ServiceState};

fn dump_startup_info(config: &Config) {
    traceline_log::info!("launching traceline ingestion server");
    traceline_log::info!("  listen address: {}", config.listen_addr);
    traceline_log::info!(
        "  rate limiting: {}",
        if config.rate_limiting_enabled() {
            "enabled"
        } else {
            "disabled (self-hosted)"
        }
    );
    traceline_log::info!(
        "  worker fan-out: {}",
        if config.worker.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => traceline_log::error!("failed to install SIGTERM handler: {error}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    traceline_log::info!("shutdown signal received, draining connections");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to read configuration")?;

    traceline_log::init(&config.log, &config.sentry);

    if let Some(addr) = &config.statsd_addr {
        traceline_statsd::init("traceline.server", addr, BTreeMap::new())
            .context("failed to initialize statsd")?;
    }

    dump_startup_info(&config);

    let listen_addr = config.listen_addr;
    let state = ServiceState::create(config)
        .await
        .context("failed to initialize service state")?;

    let app = endpoints::routes(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    traceline_log::info!("server listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}
