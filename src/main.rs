use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webhook_intake::config::Config;
use webhook_intake::processor::consumer::{ConsumerConfig, QueueConsumer};
use webhook_intake::processor::{
    GoogleCalendarProcessor, ProcessorRegistry, StripePaymentProcessor,
};
use webhook_intake::queue::WebhookQueue;
use webhook_intake::server::{AppState, build_router};
use webhook_intake::store::EventStore;
use webhook_intake::sweeper::{self, SweeperConfig};
use webhook_intake::types::Provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_intake=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store = EventStore::new(config.store_dir());
    let queue = WebhookQueue::new(config.queue_dir());

    let mut registry = ProcessorRegistry::new();
    registry.register(Provider::Stripe, Arc::new(StripePaymentProcessor));
    registry.register(Provider::GoogleCalendar, Arc::new(GoogleCalendarProcessor));

    let shutdown = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();

    // Only calendar pushes flow through the queue; Stripe dispatches inline
    // in its handler.
    let consumer = QueueConsumer::new(
        Provider::GoogleCalendar,
        queue.provider_dir(Provider::GoogleCalendar),
        store.clone(),
        registry.clone(),
        ConsumerConfig {
            poll_interval: config.poll_interval,
            ..ConsumerConfig::default()
        },
    );
    // Crash recovery must finish before the consumer starts.
    consumer.recover()?;
    tasks.spawn(consumer.run(shutdown.clone()));

    tasks.spawn(sweeper::run(
        store.clone(),
        SweeperConfig {
            sweep_interval: config.sweep_interval,
        },
        shutdown.clone(),
    ));

    let state = AppState::new(store, queue, registry, config.stripe_secret.clone());
    let app = build_router(state);

    info!(addr = %config.listen_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("SIGINT received, shutting down");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    // Server is done accepting; stop the background tasks.
    shutdown.cancel();
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "background task panicked");
        }
    }

    info!("shutdown complete");
    Ok(())
}
