use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use realtime_events::adapters::{self, http::build_app, http::RelayAppState};
use realtime_events::application::{
    ConsumerHealth, Dispatcher, QueueConsumer, ReconnectPolicy, SubscriberRegistry,
};
use realtime_events::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);
    config.validate().context("invalid configuration")?;

    let registry = SubscriberRegistry::new_shared();
    let dispatcher = Dispatcher::new_shared(registry.clone());
    let health = Arc::new(ConsumerHealth::new());

    // queue consumer: runs beside the HTTP server, never takes it down
    let broker = adapters::message_broker(&config.broker)?;
    let consumer = QueueConsumer::new(
        broker,
        dispatcher.clone(),
        ReconnectPolicy::from_config(&config.broker),
        health.clone(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run(shutdown_rx).await {
            tracing::error!(error = %e, "Queue consumer stopped; HTTP endpoints stay up");
        }
    });

    let state = RelayAppState::new(dispatcher, health, config.relay.subscriber_buffer);
    let app = build_app(state, &config.server);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, queue = %config.broker.stream, "Realtime relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, registry))
        .await?;

    let _ = consumer_task.await;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if config.is_production() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Resolves on Ctrl-C or SIGTERM after stopping the consumer and closing
/// every subscriber connection.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>, registry: Arc<SubscriberRegistry>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    let closed = registry.shutdown().await;
    info!(subscribers = closed, "Closed subscriber connections");
}
