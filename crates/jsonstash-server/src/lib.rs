use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use jsonstash_core::{
    ErrorKind, InsertResponse, JsonStashError, MemoryStore, QueryEngine, QueryRequest,
    QueryResponse, Record, RecordStore, WalStore,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

pub mod config;

pub use config::{ServerConfig, StoreKind};

#[derive(Clone)]
pub struct AppState {
    engine: QueryEngine,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            engine: QueryEngine::new(store),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/api/dataset/:dataset/record", post(insert_record))
        .route("/api/dataset/:dataset/query", get(query_dataset))
        .with_state(state)
}

pub fn open_store(cfg: &ServerConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    Ok(match cfg.store {
        StoreKind::Wal => Arc::new(WalStore::open(&cfg.data_dir)?),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    })
}

pub async fn serve() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = ServerConfig::from_env()?;
    let store = open_store(&cfg)?;

    // background WAL flusher (group commit)
    if cfg.store == StoreKind::Wal && cfg.wal_flush_ms > 0 {
        let store = store.clone();
        let every = std::time::Duration::from_millis(cfg.wal_flush_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = store.flush() {
                    tracing::warn!("wal flush failed: {e}");
                }
            }
        });
    }

    let listener = TcpListener::bind(cfg.listen).await?;
    tracing::info!(addr = %cfg.listen, store = ?cfg.store, "listening");
    run(listener, store, shutdown_signal()).await
}

/// Serve until `shutdown` resolves, then drain connections and flush the
/// store so acknowledged inserts are durable.
pub async fn run<F>(listener: TcpListener, store: Arc<dyn RecordStore>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(AppState::new(store.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    store.flush()?;
    tracing::info!("shut down, store flushed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let s = state.engine.store().stats();
    let body = format!(
        "jsonstash_datasets {}\njsonstash_records {}\njsonstash_wal_bytes {}\n",
        s.datasets, s.records, s.wal_bytes,
    );
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        body,
    )
}

async fn insert_record(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    uri: Uri,
    body: Result<Json<Record>, JsonRejection>,
) -> Result<Json<InsertResponse>, ApiError> {
    let Json(record) = body.map_err(|rej| ApiError::bad_request(rej.body_text(), &uri))?;
    let resp = state
        .engine
        .insert(&dataset, &record)
        .map_err(|e| ApiError::from_core(e, &uri))?;
    Ok(Json(resp))
}

async fn query_dataset(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Query(request): Query<QueryRequest>,
    uri: Uri,
) -> Result<Json<QueryResponse>, ApiError> {
    let resp = state
        .engine
        .query(&dataset, &request)
        .map_err(|e| ApiError::from_core(e, &uri))?;
    Ok(Json(resp))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    timestamp: String,
    status: u16,
    error: &'a str,
    message: &'a str,
    path: &'a str,
}

impl ApiError {
    fn bad_request(message: String, uri: &Uri) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
            path: uri.path().to_string(),
        }
    }

    fn from_core(err: JsonStashError, uri: &Uri) -> Self {
        let status = match err.kind() {
            ErrorKind::ClientError => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ServerError => {
                tracing::error!(path = uri.path(), "api_error" = %err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
            path: uri.path().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: self.status.as_u16(),
            error: self.status.canonical_reason().unwrap_or("Unknown"),
            message: &self.message,
            path: &self.path,
        };
        (self.status, Json(body)).into_response()
    }
}
