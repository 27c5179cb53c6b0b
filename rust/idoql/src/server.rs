use crate::{
    config::AppConfig,
    db,
    error::{ServiceError, ServiceResult},
    query::{self, QueryDescription, QueryEngine, TranslateRequest, TranslateResponse},
    state::AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        query::validate_facades()?;

        let config = Arc::new(config);
        let engine = QueryEngine::from_config(Arc::clone(&config));

        if config.schema_version.is_none() {
            match db::probe_schema_version(&config).await {
                Ok(Some(version)) => engine.versions().insert(&config.connection, version),
                Ok(None) => {}
                Err(err) => warn!(error = ?err, "schema version probe failed, assuming the floor"),
            }
        }

        let state = AppState::new(Arc::clone(&config), engine);
        Ok(Self { config, state })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, dialect = %self.config.connection.dialect, "idoql listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/queries", get(queries))
        .route("/translate", post(translate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn queries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ServiceResult<Json<Vec<QueryDescription>>> {
    enforce_api_key(&headers, &state.config)?;
    Ok(Json(state.engine.describe().await?))
}

async fn translate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TranslateRequest>,
) -> ServiceResult<Json<TranslateResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let response = state.engine.translate(request).await?;
    Ok(Json(response))
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> ServiceResult<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}
