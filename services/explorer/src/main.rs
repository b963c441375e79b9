mod broadcaster;
mod config;
mod event_buffer;
mod filter;
mod handlers;
mod router;
mod state;
mod store;
mod templates;

use broadcaster::Broadcaster;
use config::Config;
use router::create_router;
use state::AppState;
use std::sync::Arc;
use store::cache::StatsCache;
use store::mock::MockStore;
use store::pg::PgStore;
use store::Store;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use types::event::Event;

const EVENT_CHANNEL_SIZE: usize = 1000;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tracing::info!("starting devnet explorer");

    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_SIZE);
    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    // Storage backend plus its event feeder task.
    let store: Arc<dyn Store> = if config.mock_store {
        tracing::info!("using mock store");
        let store = Arc::new(MockStore::new());
        let feeder = Arc::clone(&store);
        let token = shutdown.clone();
        tasks.spawn(async move { feeder.run_generator(events_tx, token).await });
        store
    } else {
        let store = Arc::new(PgStore::connect(&config.dsn).await?);
        let feeder = Arc::clone(&store);
        let token = shutdown.clone();
        tasks.spawn(async move { feeder.run_listener(events_tx, token).await });
        store
    };

    // Stats cache: an initial refresh failure is fatal, later ones are not.
    let stats = Arc::new(StatsCache::new(
        Arc::clone(&store),
        config.cache_refresh_interval,
    ));
    stats.refresh().await?;
    {
        let stats = Arc::clone(&stats);
        let token = shutdown.clone();
        tasks.spawn(async move { stats.run(token).await });
    }

    let broadcaster = Broadcaster::new(config.retry_timeout, shutdown.clone());
    {
        let broadcaster = broadcaster.clone();
        let stats = Arc::clone(&stats);
        tasks.spawn(async move { broadcaster.run(events_rx, stats).await });
    }

    let app = create_router(AppState::new(store, stats, broadcaster));
    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %format!("http://{}", config.listen_addr), "server starting");
    {
        let token = shutdown.clone();
        tasks.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await?;
            tracing::info!("server stopped");
            Ok(())
        });
    }

    tasks.spawn(async move {
        tokio::signal::ctrl_c().await?;
        tracing::info!("SIGINT received, stopping application");
        Ok(())
    });

    // The first task to finish, cleanly or not, takes the whole
    // application down; remaining tasks stop via the shared token.
    let mut result = match tasks.join_next().await {
        Some(first) => flatten(first),
        None => Ok(()),
    };
    shutdown.cancel();
    while let Some(next) = tasks.join_next().await {
        if let Err(err) = flatten(next) {
            if result.is_ok() {
                result = Err(err);
            } else {
                tracing::error!(error = %err, "task failed during shutdown");
            }
        }
    }
    result
}

fn flatten(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    joined.map_err(anyhow::Error::from).and_then(|res| res)
}
