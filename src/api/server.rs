//! API Server
//!
//! Wires the engine, the RocksDB store, the event feed and the fulfillment
//! worker together and serves the router until a shutdown signal arrives.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{
    config::{ApiConfig, DealConfig},
    errors::DealResult,
    feed::EventFeed,
    fulfillment::{FulfillmentWorker, SharedEngine},
    games::{build_oracle, GameEngine, GameSettings},
    store::{GameStore, StoreWriter},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, sync::Mutex};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Build the application with its middleware stack
pub fn build_app(state: Arc<AppState>, config: &ApiConfig) -> axum::Router {
    // Outermost first: tracing sees every request, request IDs are assigned innermost
    create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(create_cors_layer(&config.allowed_origins))
            .layer(axum::middleware::from_fn(request_id_middleware)),
    )
}

/// Rebuild the engine from stored records, or start empty
pub fn bootstrap_engine(config: &DealConfig, store: Option<&GameStore>) -> DealResult<GameEngine> {
    let settings = GameSettings::from_config(config);
    let oracle = build_oracle(&config.oracle)?;

    let snapshot = match store {
        Some(store) => store.load(&settings.owner)?,
        None => None,
    };

    Ok(match snapshot {
        Some(snapshot) => GameEngine::from_snapshot(settings, oracle, snapshot),
        None => {
            info!("Starting with an empty engine");
            GameEngine::new(settings, oracle)
        }
    })
}

pub struct ApiServer {
    config: DealConfig,
}

impl ApiServer {
    pub fn new(config: DealConfig) -> Self {
        Self { config }
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let store = if self.config.storage.enabled {
            info!(path = %self.config.storage.db_path, "Opening RocksDB store");
            Some(GameStore::open(&self.config.storage.db_path)?)
        } else {
            warn!("Persistence disabled; state is lost on restart");
            None
        };

        let engine: SharedEngine = Arc::new(Mutex::new(bootstrap_engine(&self.config, store.as_ref())?));
        let writer = store.map(StoreWriter::spawn);
        let feed = EventFeed::new();
        let worker = FulfillmentWorker::spawn(
            engine.clone(),
            writer.clone(),
            feed.clone(),
            self.config.fulfillment_interval(),
        );

        let state = Arc::new(AppState::new(engine, writer.clone(), feed));
        let app = build_app(state, &self.config.api);
        let addr = self.socket_addr()?;

        self.log_server_info(&addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        worker.stop();
        if let Some(writer) = &writer {
            writer.flush().await;
        }
        info!(delivered = worker.delivered(), "API Server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.api.host.parse::<std::net::IpAddr>()?,
            self.config.api.port,
        )))
    }

    fn log_server_info(&self, addr: &SocketAddr) {
        let game = &self.config.game;
        info!("Deal or No Deal server listening on http://{}", addr);
        info!(
            house_percentage = game.house_percentage,
            ladder = %game.prize_ladder,
            entry_fee = game.entry_fee,
            mode = ?game.entry_fee_mode,
            denomination = ?game.denomination,
            "Game settings"
        );
        info!(
            backend = ?self.config.oracle.backend,
            fee = self.config.oracle.fee,
            interval_ms = self.config.oracle.fulfillment_interval_ms,
            "Oracle settings"
        );
        info!(
            cors = ?self.config.api.allowed_origins,
            timeout_secs = self.config.api.request_timeout_secs,
            "HTTP settings"
        );
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
