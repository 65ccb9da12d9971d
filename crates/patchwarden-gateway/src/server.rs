//! HTTP surface of the gateway

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use patchwarden_core::pipeline::RepositoryClient;
use patchwarden_core::{AgentRegistry, RemediationPipeline, SecurityGuardrails, TaskId, TaskScheduler};
use patchwarden_sandbox::GitRepositoryClient;

use crate::agents::register_endpoints;
use crate::config::GatewayConfig;
use crate::handlers::{RemediationHandler, TaskHandler};
use crate::webhook::{DispatchOutcome, EventDispatcher, OwnedDelivery};
use crate::worker::WorkerPool;
use crate::{GatewayError, Result};

const EVENT_HEADERS: &[&str] = &["x-github-event", "x-event-type"];
const DELIVERY_HEADER: &str = "x-github-delivery";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// State shared across request handlers
pub struct AppState {
    pub config: GatewayConfig,
    pub dispatcher: Arc<EventDispatcher>,
    pub scheduler: Arc<TaskScheduler>,
    pub pipeline: Arc<RemediationPipeline>,
    pub guardrails: Arc<SecurityGuardrails>,
    pub workers: WorkerPool,
    started: Instant,
}

/// Webhook gateway
pub struct Gateway {
    state: Arc<AppState>,
}

impl Gateway {
    /// Wire the dispatcher, scheduler, pipeline and workers together.
    ///
    /// Fails when no webhook secret is configured outside test mode. Must
    /// be called inside a tokio runtime.
    pub fn new(
        config: GatewayConfig,
        registry: Arc<AgentRegistry>,
        repository: Arc<dyn RepositoryClient>,
    ) -> Result<Self> {
        let verifier = config.verifier()?;
        let guardrails = Arc::new(SecurityGuardrails::new(config.guardrails.clone()));
        let scheduler = Arc::new(TaskScheduler::new(config.scheduler.clone(), registry));
        let pipeline = Arc::new(RemediationPipeline::new(
            config.pipeline.clone(),
            guardrails.clone(),
            repository,
        ));
        let workers = WorkerPool::start(&config.workers, scheduler.clone(), pipeline.clone());

        let dispatcher = Arc::new(EventDispatcher::new(verifier, &config.webhook));
        dispatcher.register(Arc::new(TaskHandler::new(scheduler.clone(), workers.queue())));
        dispatcher.register(Arc::new(RemediationHandler::new(
            guardrails.clone(),
            workers.queue(),
            config.webhook.trigger_label.clone(),
        )));

        Ok(Self {
            state: Arc::new(AppState {
                config,
                dispatcher,
                scheduler,
                pipeline,
                guardrails,
                workers,
                started: Instant::now(),
            }),
        })
    }

    /// Gateway backed by `git` and the configured HTTP agents
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let registry = Arc::new(AgentRegistry::new());
        let registered = register_endpoints(&registry, &config.agents)?;
        if registered == 0 {
            tracing::warn!("No agents configured; tasks will complete without analysis");
        }
        Self::new(config, registry, Arc::new(GitRepositoryClient::new()))
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/webhook", post(Self::handle_webhook))
            .route("/health", get(Self::handle_health))
            .route("/status", get(Self::handle_status))
            .route("/tasks/:id", get(Self::handle_task))
            .route("/deliveries", get(Self::handle_deliveries))
            .route("/runs", get(Self::handle_runs))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until ctrl-c
    pub async fn start(&self) -> Result<()> {
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        tracing::info!("Patchwarden gateway listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    // HTTP handlers

    async fn handle_webhook(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let delivery = OwnedDelivery {
            event_type: EVENT_HEADERS.iter().find_map(|h| header(*h)).map(str::to_string),
            delivery_id: header(DELIVERY_HEADER).map(str::to_string),
            signature: header(SIGNATURE_HEADER).map(str::to_string),
            body: body.to_vec(),
        };

        let outcome = match state.dispatcher.dispatch_detached(delivery).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Webhook dispatch failed: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": "error", "error": e.to_string() })),
                );
            }
        };

        match outcome {
            DispatchOutcome::Processed {
                delivery_id,
                event_type,
                processing_time,
                results,
            } => (
                StatusCode::OK,
                Json(json!({
                    "status": "processed",
                    "delivery_id": delivery_id,
                    "event_type": event_type,
                    "processing_time": processing_time,
                    "result": results,
                })),
            ),
            DispatchOutcome::Unauthorized { delivery_id, error } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "unauthorized", "delivery_id": delivery_id, "error": error })),
            ),
            DispatchOutcome::Malformed { delivery_id, error } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "malformed", "delivery_id": delivery_id, "error": error })),
            ),
        }
    }

    async fn handle_health() -> impl IntoResponse {
        Json(json!({
            "status": "healthy",
            "version": crate::VERSION
        }))
    }

    async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
        Json(json!({
            "version": crate::VERSION,
            "uptime_secs": state.started.elapsed().as_secs(),
            "webhooks": state.dispatcher.stats(),
            "scheduler": state.scheduler.get_performance_stats(),
            "pipeline": state.pipeline.stats(),
            "guardrails": state.guardrails.stats(),
            "workers": state.workers.stats(),
        }))
    }

    async fn handle_task(
        State(state): State<Arc<AppState>>,
        Path(id): Path<String>,
    ) -> impl IntoResponse {
        match TaskId::parse(&id) {
            Some(id) => (StatusCode::OK, Json(json!(state.scheduler.get_task_status(id)))),
            None => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid task id: {}", id) })),
            ),
        }
    }

    async fn handle_deliveries(
        State(state): State<Arc<AppState>>,
        Query(query): Query<LimitQuery>,
    ) -> impl IntoResponse {
        Json(json!(state.dispatcher.recent_deliveries(query.limit())))
    }

    async fn handle_runs(
        State(state): State<Arc<AppState>>,
        Query(query): Query<LimitQuery>,
    ) -> impl IntoResponse {
        Json(json!(state.workers.recent_runs(query.limit())))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(20).min(500)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
