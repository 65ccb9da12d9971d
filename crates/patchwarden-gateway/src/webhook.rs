//! Webhook ingestion
//!
//! Every delivery walks `Received -> Verified -> Classified -> Dispatched ->
//! Processed`, or drops to `Rejected` on a bad signature (unauthorized) or
//! an unparsable body (malformed). Either way exactly one
//! [`WebhookDelivery`] record is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use patchwarden_core::telemetry::{default_sink, MetricKind, MetricRecord, SharedSink};
use patchwarden_core::{Outcome, SignatureVerifier};

use crate::config::WebhookSettings;
use crate::GatewayError;

/// Lifecycle position of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Received,
    Verified,
    Classified,
    Dispatched,
    Processed,
    Rejected,
}

/// Repository a delivery refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    /// `owner/name`
    pub full_name: String,
    pub clone_url: Option<String>,
    pub html_url: Option<String>,
    pub default_branch: Option<String>,
}

impl RepositoryIdentity {
    fn from_payload(payload: &Value) -> Option<Self> {
        let repo = payload.get("repository")?;
        let text = |key: &str| repo.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            full_name: text("full_name").or_else(|| text("name"))?,
            clone_url: text("clone_url"),
            html_url: text("html_url"),
            default_branch: text("default_branch"),
        })
    }

    /// URL to clone from, preferring the explicit clone URL
    pub fn clone_url(&self) -> Option<String> {
        self.clone_url
            .clone()
            .or_else(|| self.html_url.as_ref().map(|u| format!("{}.git", u.trim_end_matches('/'))))
    }
}

/// A verified, parsed delivery handed to handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub delivery_id: String,
    pub event_type: String,
    pub action: Option<String>,
    pub repository: Option<RepositoryIdentity>,
    pub payload: Value,
}

/// Reacts to classified events
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this handler wants `event_type`
    fn handles(&self, event_type: &str) -> bool;

    async fn handle(&self, event: &ClassifiedEvent) -> Outcome<Value>;
}

/// What one handler did with one delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerReport {
    pub handler: String,
    pub outcome: Outcome<Value>,
}

/// Immutable record of one inbound delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: String,
    pub event_type: Option<String>,
    pub verified: bool,
    /// Handlers were invoked
    pub delivered: bool,
    pub state: DeliveryState,
    pub timestamp: DateTime<Utc>,
    /// Seconds
    pub processing_time: f64,
    pub error: Option<String>,
    pub handlers: Vec<HandlerReport>,
}

/// Result of dispatching one delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Processed {
        delivery_id: String,
        event_type: String,
        processing_time: f64,
        results: Vec<HandlerReport>,
    },
    Unauthorized {
        delivery_id: String,
        error: String,
    },
    Malformed {
        delivery_id: String,
        error: String,
    },
}

/// Raw inbound delivery as received over HTTP
#[derive(Debug, Clone, Copy)]
pub struct InboundDelivery<'a> {
    pub event_type: Option<&'a str>,
    pub delivery_id: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

/// Owned copy of an inbound delivery, for dispatching off the request task
#[derive(Debug, Clone, Default)]
pub struct OwnedDelivery {
    pub event_type: Option<String>,
    pub delivery_id: Option<String>,
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

impl OwnedDelivery {
    pub fn as_inbound(&self) -> InboundDelivery<'_> {
        InboundDelivery {
            event_type: self.event_type.as_deref(),
            delivery_id: self.delivery_id.as_deref(),
            signature: self.signature.as_deref(),
            body: &self.body,
        }
    }
}

/// Aggregate ingestion statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookStats {
    pub total_deliveries: u64,
    pub processed: u64,
    pub rejected: u64,
    /// Seconds
    pub average_processing_time: f64,
    pub latency_target: f64,
    pub meets_latency_target: bool,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    processed: u64,
    rejected: u64,
    total_time: f64,
}

/// Verifies, classifies and fans deliveries out to handlers
pub struct EventDispatcher {
    verifier: SignatureVerifier,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    history: Mutex<VecDeque<WebhookDelivery>>,
    history_capacity: usize,
    counters: Mutex<Counters>,
    latency_target: f64,
    handler_timeout: Duration,
    sink: SharedSink,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("verifier", &self.verifier)
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(verifier: SignatureVerifier, settings: &WebhookSettings) -> Self {
        Self {
            verifier,
            handlers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            history_capacity: settings.history_capacity.max(1),
            counters: Mutex::new(Counters::default()),
            latency_target: settings.latency_target_secs,
            handler_timeout: settings.handler_timeout(),
            sink: default_sink(),
        }
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        tracing::info!("Event handler registered: {}", handler.name());
        self.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Run one delivery through the state machine
    pub async fn dispatch(&self, inbound: InboundDelivery<'_>) -> DispatchOutcome {
        let started = Instant::now();
        let delivery_id = inbound
            .delivery_id
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::debug!("Delivery {} {:?}", delivery_id, DeliveryState::Received);

        if !self.verifier.verify(inbound.body, inbound.signature) {
            let error = "invalid or missing signature".to_string();
            tracing::warn!("Delivery {} rejected: {}", delivery_id, error);
            self.finish(
                started,
                WebhookDelivery {
                    id: delivery_id.clone(),
                    event_type: inbound.event_type.map(str::to_string),
                    verified: false,
                    delivered: false,
                    state: DeliveryState::Rejected,
                    timestamp: Utc::now(),
                    processing_time: 0.0,
                    error: Some(error.clone()),
                    handlers: Vec::new(),
                },
            );
            return DispatchOutcome::Unauthorized { delivery_id, error };
        }
        tracing::debug!("Delivery {} {:?}", delivery_id, DeliveryState::Verified);

        let event = match classify(&delivery_id, inbound.event_type, inbound.body) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!("Delivery {} malformed: {}", delivery_id, error);
                self.finish(
                    started,
                    WebhookDelivery {
                        id: delivery_id.clone(),
                        event_type: inbound.event_type.map(str::to_string),
                        verified: true,
                        delivered: false,
                        state: DeliveryState::Rejected,
                        timestamp: Utc::now(),
                        processing_time: 0.0,
                        error: Some(error.clone()),
                        handlers: Vec::new(),
                    },
                );
                return DispatchOutcome::Malformed { delivery_id, error };
            }
        };
        tracing::debug!(
            "Delivery {} {:?} as {}",
            delivery_id,
            DeliveryState::Classified,
            event.event_type
        );

        let results = self.run_handlers(event.clone()).await;
        let processing_time = started.elapsed().as_secs_f64();
        self.finish(
            started,
            WebhookDelivery {
                id: delivery_id.clone(),
                event_type: Some(event.event_type.clone()),
                verified: true,
                delivered: true,
                state: DeliveryState::Processed,
                timestamp: Utc::now(),
                processing_time,
                error: None,
                handlers: results.clone(),
            },
        );

        DispatchOutcome::Processed {
            delivery_id,
            event_type: event.event_type,
            processing_time,
            results,
        }
    }

    /// Dispatch on a spawned task. The delivery runs to completion and is
    /// recorded even if the caller stops waiting for it.
    pub async fn dispatch_detached(
        self: &Arc<Self>,
        delivery: OwnedDelivery,
    ) -> crate::Result<DispatchOutcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(delivery.as_inbound()).await })
            .await
            .map_err(|e| GatewayError::Internal(format!("dispatch task failed: {}", e)))
    }

    /// Invoke every interested handler concurrently. A handler that fails,
    /// panics or times out only affects its own report.
    async fn run_handlers(&self, event: ClassifiedEvent) -> Vec<HandlerReport> {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .iter()
            .filter(|h| h.handles(&event.event_type))
            .cloned()
            .collect();
        tracing::debug!(
            "Delivery {} {:?} to {} handlers",
            event.delivery_id,
            DeliveryState::Dispatched,
            handlers.len()
        );

        let event = Arc::new(event);
        let timeout = self.handler_timeout;
        let spawned = handlers.iter().map(|handler| {
            let handler = handler.clone();
            let event = event.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(timeout, handler.handle(&event)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::faulted(format!(
                        "handler timed out after {}s",
                        timeout.as_secs()
                    )),
                }
            })
        });
        let joined = join_all(spawned).await;

        handlers
            .iter()
            .zip(joined)
            .map(|(handler, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    tracing::error!("Handler {} panicked: {}", handler.name(), e);
                    Outcome::faulted(format!("handler panicked: {}", e))
                });
                if outcome.is_faulted() {
                    tracing::error!("Handler {} failed on {}", handler.name(), event.delivery_id);
                }
                HandlerReport {
                    handler: handler.name().to_string(),
                    outcome,
                }
            })
            .collect()
    }

    fn finish(&self, started: Instant, mut delivery: WebhookDelivery) {
        let elapsed = started.elapsed().as_secs_f64();
        delivery.processing_time = elapsed;

        let average = {
            let mut counters = self.counters.lock();
            counters.total += 1;
            counters.total_time += elapsed;
            if delivery.state == DeliveryState::Rejected {
                counters.rejected += 1;
            } else {
                counters.processed += 1;
            }
            counters.total_time / counters.total as f64
        };
        if average > self.latency_target {
            tracing::warn!(
                "Mean webhook processing time {:.3}s exceeds target {:.1}s",
                average,
                self.latency_target
            );
        }

        let outcome = match (&delivery.state, delivery.verified) {
            (DeliveryState::Rejected, false) => "unauthorized",
            (DeliveryState::Rejected, true) => "malformed",
            _ => "processed",
        };
        self.sink.record(MetricRecord::new(
            MetricKind::WebhookDelivery,
            delivery.id.clone(),
            elapsed,
            outcome,
            elapsed <= self.latency_target,
        ));

        let mut history = self.history.lock();
        history.push_back(delivery);
        while history.len() > self.history_capacity {
            history.pop_front();
        }
    }

    /// Most recent delivery records, newest first
    pub fn recent_deliveries(&self, count: usize) -> Vec<WebhookDelivery> {
        self.history.lock().iter().rev().take(count).cloned().collect()
    }

    pub fn stats(&self) -> WebhookStats {
        let counters = self.counters.lock();
        let average = if counters.total == 0 {
            0.0
        } else {
            counters.total_time / counters.total as f64
        };
        WebhookStats {
            total_deliveries: counters.total,
            processed: counters.processed,
            rejected: counters.rejected,
            average_processing_time: average,
            latency_target: self.latency_target,
            meets_latency_target: average < self.latency_target,
        }
    }
}

/// Parse a verified body into a [`ClassifiedEvent`]
fn classify(
    delivery_id: &str,
    header_event: Option<&str>,
    body: &[u8],
) -> Result<ClassifiedEvent, String> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| format!("body is not valid JSON: {}", e))?;
    if !payload.is_object() {
        return Err("body must be a JSON object".to_string());
    }

    let event_type = header_event
        .filter(|e| !e.trim().is_empty())
        .map(|e| e.trim().to_string())
        .or_else(|| {
            payload
                .get("event_type")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| "event type is missing".to_string())?;

    Ok(ClassifiedEvent {
        delivery_id: delivery_id.to_string(),
        event_type,
        action: payload.get("action").and_then(Value::as_str).map(str::to_string),
        repository: RepositoryIdentity::from_payload(&payload),
        payload,
    })
}
