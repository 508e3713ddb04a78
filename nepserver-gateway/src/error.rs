// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the gateway

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Listener socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unserializable DNS message
    #[error("DNS message error: {0}")]
    Dns(#[from] hickory_proto::error::ProtoError),

    /// Upstream resolver timed out or failed
    #[error("Upstream DNS failure: {0}")]
    UpstreamDnsFailure(String),

    /// Message bus not reachable at setup
    #[error("Bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Publish rejected by the bus client
    #[error("Publish failed on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// Metrics registry or encoder failure
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// JSON rendering failure
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<prometheus::Error> for GatewayError {
    fn from(err: prometheus::Error) -> Self {
        GatewayError::Metrics(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
