//! HTTP server for worthboard.
//!
//! Exposes the user visit endpoint, the leaderboard, a health check and
//! Prometheus metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cache::{MokaScoreCache, RedisScoreCache, ScoreCache};
use crate::error::{ErrorKind, InputError, ServiceError};
use crate::leaderboard::LeaderboardRanker;
use crate::model::{LeaderboardEntry, UpdateOutcome};
use crate::oracle::{EthRpcOracle, DEFAULT_RPC};
use crate::store::{InMemoryRecordStore, PostgresRecordStore, RecordStore};
use crate::updater::{UserStateUpdater, DEFAULT_MAX_STORE_ATTEMPTS};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Balance RPC URL
    pub rpc_url: String,
    /// Timeout for one balance lookup
    pub rpc_timeout: Duration,
    /// Postgres URL (None = in-memory records)
    pub database_url: Option<String>,
    /// Redis URL (None = in-process cache)
    pub redis_url: Option<String>,
    /// Maximum in-process cache entries
    pub cache_max_entries: u64,
    /// Conditional-write rounds per update
    pub max_store_attempts: u32,
    /// Allowed CORS origins (None/empty = allow any)
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            rpc_url: DEFAULT_RPC.to_string(),
            rpc_timeout: Duration::from_secs(10),
            database_url: None,
            redis_url: None,
            cache_max_entries: 10_000,
            max_store_attempts: DEFAULT_MAX_STORE_ATTEMPTS,
            allowed_origins: None,
        }
    }
}

impl ServerConfig {
    /// Database URL for one-shot CLI commands, which cannot use the
    /// in-memory store.
    pub fn require_database(&self, command: &str) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            eyre::eyre!("`{}` needs a record store: set --database-url or DATABASE_URL", command)
        })
    }
}

/// Body of `POST /api/userdata`, sent as JSON or as a urlencoded form.
#[derive(Debug, Deserialize)]
pub struct UserDataRequest {
    #[serde(default)]
    pub address: Option<String>,
}

#[async_trait]
impl<S> FromRequest<S> for UserDataRequest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, axum::Json<ErrorResponse>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let parsed = if is_form {
            axum::Form::<UserDataRequest>::from_request(req, state)
                .await
                .map(|axum::Form(body)| body)
                .map_err(|rejection| rejection.body_text())
        } else {
            axum::Json::<UserDataRequest>::from_request(req, state)
                .await
                .map(|axum::Json(body)| body)
                .map_err(|rejection| rejection.body_text())
        };

        parsed.map_err(|reason| {
            tracing::warn!(%reason, "rejected user data request body");
            error_response(&InputError::Body(reason).into())
        })
    }
}

/// Error body for failed requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Server state
pub struct AppState {
    pub updater: UserStateUpdater,
    pub ranker: LeaderboardRanker,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(updater: UserStateUpdater, ranker: LeaderboardRanker) -> Self {
        Self {
            updater,
            ranker,
            start_time: Instant::now(),
        }
    }

    /// Wire up the oracle and stores selected by `config`.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let oracle = Arc::new(EthRpcOracle::new(&config.rpc_url).with_timeout(config.rpc_timeout));

        let store: Arc<dyn RecordStore> = match &config.database_url {
            Some(url) => Arc::new(
                PostgresRecordStore::connect(url)
                    .await
                    .wrap_err("failed to connect to record store")?,
            ),
            None => {
                tracing::warn!("no database configured, user records are kept in memory");
                Arc::new(InMemoryRecordStore::new())
            }
        };

        let cache: Arc<dyn ScoreCache> = match &config.redis_url {
            Some(url) => Arc::new(
                RedisScoreCache::connect(url)
                    .await
                    .wrap_err("failed to connect to score cache")?,
            ),
            None => Arc::new(MokaScoreCache::new(config.cache_max_entries)),
        };

        let updater = UserStateUpdater::new(oracle, store.clone(), cache)
            .with_max_store_attempts(config.max_store_attempts);
        Ok(Self::new(updater, LeaderboardRanker::new(store)))
    }
}

/// Build the CORS layer. Without configured origins every origin is allowed.
fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    match allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed: Vec<axum::http::HeaderValue> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(methods)
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ])
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}

/// Application routes without the metrics endpoint.
pub fn build_router(state: Arc<AppState>, allowed_origins: Option<&[String]>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/userdata", post(userdata_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let prometheus_handle = crate::metrics::install_prometheus_recorder()?;
    let state = Arc::new(AppState::from_config(&config).await?);

    let app = build_router(state, config.allowed_origins.as_deref()).route(
        "/metrics",
        get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("worthboard server listening on {}", config.bind_addr);
    tracing::info!("Endpoints: GET /health, GET /metrics, POST /api/userdata, GET /api/leaderboard");

    axum::serve(listener, app).await?;
    Ok(())
}

fn error_response(err: &ServiceError) -> (StatusCode, axum::Json<ErrorResponse>) {
    let status = match err.kind() {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::Oracle => StatusCode::BAD_GATEWAY,
        ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        axum::Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
}

/// Health check handler
async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Record a visit and return the fresh score.
async fn userdata_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    request: UserDataRequest,
) -> Result<axum::Json<UpdateOutcome>, (StatusCode, axum::Json<ErrorResponse>)> {
    let address = request.address.unwrap_or_default();
    tracing::info!(%address, "received user data request");

    state.updater.update(&address).await.map(axum::Json).map_err(|e| {
        tracing::warn!(%address, error = %e, kind = ?e.kind(), "user data request failed");
        error_response(&e)
    })
}

/// Leaderboard handler
async fn leaderboard_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<axum::Json<Vec<LeaderboardEntry>>, (StatusCode, axum::Json<ErrorResponse>)> {
    state.ranker.rank().await.map(axum::Json).map_err(|e| {
        tracing::warn!(error = %e, "leaderboard query failed");
        error_response(&ServiceError::from(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_seconds: 100,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_seconds\":100"));
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = error_response(&InputError::Missing.into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.kind, ErrorKind::Input);

        let (status, _) = error_response(&OracleError::Rpc("down".into()).into());
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_one_shot_commands_require_database() {
        let config = ServerConfig::default();
        let err = config.require_database("leaderboard").unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = ServerConfig {
            database_url: Some("postgres://localhost/worthboard".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.require_database("visit").unwrap(),
            "postgres://localhost/worthboard"
        );
    }

    #[test]
    fn test_request_without_address() {
        let request: UserDataRequest = serde_json::from_str("{}").unwrap();
        assert!(request.address.is_none());
    }
}
