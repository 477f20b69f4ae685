use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use visitor_counter::{
    clock::{Clock, SystemClock},
    dedup::DedupCache,
    errors::InitError,
    router, AppState, Config, Store, VisitorService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    if let Err(err) = run(Config::from_env()).await {
        error!("{err}");
        return Err(err.into());
    }
    Ok(())
}

async fn run(config: Config) -> Result<(), InitError> {
    info!("opening visitor store at {}", config.database_path.display());
    let store = Store::open(&config.database_path, config.store_timeout).await?;
    let total = store.visitor_total().await?;
    info!("current visitor count: {}", total.total_count);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dedup = DedupCache::new(config.dedup_window, Arc::clone(&clock));
    info!("dedup window: {}s", dedup.window().num_seconds());
    let state = AppState::new(VisitorService::new(store, dedup, clock));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                error!("failed to install terminate handler: {err}");
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
}
