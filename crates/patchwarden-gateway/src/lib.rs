//! Patchwarden Gateway - webhook ingestion and background processing
//!
//! ```text
//!   POST /webhook
//!        │
//!        ▼
//!  ┌──────────────┐   bad signature / bad body -> 401 / 400
//!  │  Dispatcher  │
//!  └──────┬───────┘
//!         │ classified event
//!   ┌─────┴──────────────┐
//!   ▼                    ▼
//! TaskHandler     RemediationHandler
//!   │                    │ guardrail check
//!   └────────┬───────────┘
//!            ▼
//!       Work queue ──► workers ──► scheduler / pipeline
//! ```
//!
//! Handlers only enqueue work, so a delivery is answered long before any
//! agent or test run finishes.

#![deny(unsafe_code)]

pub mod agents;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod webhook;
pub mod worker;

pub use agents::{register_endpoints, HttpAgent};
pub use config::{AgentEndpoint, GatewayConfig, WebhookSettings, WorkerSettings};
pub use error::{GatewayError, Result};
pub use handlers::{RemediationHandler, TaskHandler};
pub use server::{AppState, Gateway};
pub use webhook::{
    ClassifiedEvent, DeliveryState, DispatchOutcome, EventDispatcher, EventHandler, HandlerReport,
    InboundDelivery, OwnedDelivery, WebhookDelivery, WebhookStats,
};
pub use worker::{Job, JobQueue, WorkerPool, WorkerStats};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen port
pub const DEFAULT_PORT: u16 = 8787;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
