//! HTTP surface over the [`Dispatcher`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    azure::BackendKind,
    config::BridgeConfig,
    dispatcher::Dispatcher,
    metrics,
    models::{MetricResponse, QueryParams},
    selector::Selector,
    BridgeError,
    Result,
};

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/query/:backend", get(query_metric))
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn query_metric(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<MetricResponse>> {
    let kind: BackendKind = backend.parse()?;
    let selector = params
        .label_selector
        .as_deref()
        .map(str::parse::<Selector>)
        .transpose()?;

    let response = state.dispatcher.query(kind, selector.as_ref()).await?;
    Ok(Json(response))
}

async fn prometheus_metrics() -> Result<String> {
    metrics::gather_text()
}

async fn healthz() -> &'static str {
    "ok"
}

pub async fn serve(config: &BridgeConfig, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let app = router(ApiState { dispatcher });
    info!("Starting external metrics bridge on {}", config.listen_addr);

    let listener = TcpListener::bind(config.listen_addr).await.map_err(|e|
        BridgeError::Config(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app).await.map_err(|e|
        BridgeError::Transport(format!("Server error: {}", e)))?;

    Ok(())
}
