pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::db::{MetadataStore, SqliteMetadataStore};
use crate::error::{Error, Result};
use crate::pipeline::{load_encoder, DurableHolder, Encoder, IndexHolder};
use crate::storage::{ObjectStore, S3Store};

/// Everything a request handler needs. All pieces are created once at
/// startup and shared; the build lock serializes process-video requests so
/// at most one index build is in flight.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub encoder: Arc<dyn Encoder>,
    pub holder: Arc<dyn IndexHolder>,
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub build_lock: Arc<Mutex<()>>,
}

pub fn router(state: AppState) -> Result<Router> {
    let origin = state
        .config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| Error::Internal(anyhow::anyhow!("invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/health", get(routes::health))
        .route("/video/health-check", get(routes::health))
        .route("/video/get-signed-url", post(routes::get_signed_url))
        .route("/video/process", post(routes::process_video))
        .route("/search", get(routes::search))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

/// Wire up all collaborators and serve until shutdown. The encoder load is
/// fatal here, before the listener binds: a server that cannot embed has
/// nothing to offer.
pub async fn run(config: AppConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .map_err(|e| {
            Error::Internal(anyhow::anyhow!("{}: {}", config.data_dir.display(), e))
        })?;

    let encoder = load_encoder(&config.encoder)?;
    let holder: Arc<dyn IndexHolder> = Arc::new(DurableHolder::open(config.index_prefix())?);
    let objects: Arc<dyn ObjectStore> = Arc::new(S3Store::new(
        config.storage.clone(),
        Duration::from_secs(config.limits.download_timeout_secs),
    ));
    let metadata: Arc<dyn MetadataStore> =
        Arc::new(SqliteMetadataStore::connect(&config.database_url()).await?);

    let bind = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config),
        encoder,
        holder,
        objects,
        metadata,
        build_lock: Arc::new(Mutex::new(())),
    };

    let app = router(state)?;
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| Error::Internal(anyhow::anyhow!("cannot bind {}: {}", bind, e)))?;
    info!(%bind, "framefinder listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(anyhow::anyhow!("server error: {}", e)))
}
