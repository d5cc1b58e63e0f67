use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use traceline_queue::{Consumer, ConsumerConfig};
use traceline_worker::eval::HttpScorer;
use traceline_worker::handlers::{EvalJobCreator, EvalJobExecutor};
use traceline_worker::{endpoints, Config, WorkerState};

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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to read configuration")?;

    traceline_log::init(&config.log, &config.sentry);

    if let Some(addr) = &config.statsd_addr {
        traceline_statsd::init("traceline.worker", addr, BTreeMap::new())
            .context("failed to initialize statsd")?;
    }

    traceline_log::info!("launching traceline worker");
    traceline_log::info!("  listen address: {}", config.listen_addr);
    traceline_log::info!("  creator concurrency: {}", config.creator_concurrency);
    traceline_log::info!("  executor concurrency: {}", config.executor_concurrency);

    let listen_addr = config.listen_addr;
    let creator_concurrency = config.creator_concurrency;
    let executor_concurrency = config.executor_concurrency;

    let state = WorkerState::create(config)
        .await
        .context("failed to initialize worker state")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let creator = Consumer::new(
        state.trace_queue().clone(),
        EvalJobCreator::new(
            state.store().clone(),
            state.trace_queue().clone(),
            state.exec_queue().clone(),
        ),
        ConsumerConfig {
            concurrency: creator_concurrency,
            ..ConsumerConfig::default()
        },
    );

    let executor = Consumer::new(
        state.exec_queue().clone(),
        EvalJobExecutor::new(
            state.store().clone(),
            state.exec_queue().clone(),
            Arc::new(HttpScorer::new()),
        ),
        ConsumerConfig {
            concurrency: executor_concurrency,
            ..ConsumerConfig::default()
        },
    );

    let creator_handle = tokio::spawn(creator.run(shutdown_rx.clone()));
    let executor_handle = tokio::spawn(executor.run(shutdown_rx));

    let app = endpoints::routes(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    traceline_log::info!("worker listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // HTTP is drained; stop the consumers and let in-flight jobs finish.
    traceline_log::info!("shutting down queue consumers");
    let _ = shutdown_tx.send(true);
    let _ = creator_handle.await;
    let _ = executor_handle.await;

    Ok(())
}
