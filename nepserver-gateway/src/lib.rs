// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # NEP Gateway - local endpoint for NEP micro-inverters
//!
//! Micro-inverters report to a fixed vendor hostname. This crate answers
//! that hostname on the local DNS, accepts the device frames over HTTP and
//! exposes the latest reading per inverter as OpenMetrics and JSON. An
//! optional MQTT bridge republishes every reading with Home Assistant
//! discovery documents.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nepserver_gateway::{shutdown_signal, Gateway, GatewayConfig};
//!
//! # async fn run() -> nepserver_gateway::Result<()> {
//! let gateway = Gateway::bind(GatewayConfig::default()).await?;
//! println!("HTTP on {}", gateway.http_addr()?);
//! gateway.run(shutdown_signal()).await
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  A www.nepviewer.net?   ┌──────────────────────────┐
//! │ Inverter     │ ──────────────────────► │ DnsServer (UDP)          │
//! │              │ ◄────── local addr ──── │   other names ─► upstream│
//! │              │                         └──────────────────────────┘
//! │              │  POST /i.php (frame)    ┌──────────────────────────┐
//! │              │ ──────────────────────► │ HTTP ingress (axum)      │
//! │              │ ◄── YYYYDDMMHHmmss ──── │   decode ─► store        │
//! └──────────────┘                         │   └─► NotificationBridge │──► MQTT
//!                                          │ GET /metrics  /json      │──► scrapers
//!                                          └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Listener, resolver and bridge settings, CLI arguments
//! - [`dns`]: Interception resolver
//! - [`http`]: Ingress and exposition routes
//! - [`metrics`]: OpenMetrics encoding of a store snapshot
//! - [`bridge`]: MQTT publishing
//! - [`discovery`]: Home Assistant discovery documents and topics
//! - [`gateway`]: Binding and running the listeners together

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod dns;
pub mod error;
pub mod gateway;
pub mod http;
pub mod metrics;

// Re-exports for convenient access
pub use bridge::{MqttPublisher, NotificationBridge, Publisher};
pub use config::{Args, BridgeConfig, DnsConfig, GatewayConfig, HttpConfig};
pub use discovery::DiscoveryDescriptor;
pub use dns::{DnsInterceptor, DnsServer, INTERCEPT_TTL};
pub use error::{GatewayError, Result};
pub use gateway::{shutdown_signal, Gateway};
pub use http::{acknowledgment, router, AppState};
pub use metrics::{encode_metrics, OPENMETRICS_CONTENT_TYPE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
