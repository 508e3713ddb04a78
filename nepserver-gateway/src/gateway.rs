// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Runtime wiring of the listeners
//!
//! The DNS resolver and the HTTP ingress run as two independent tasks.
//! They share nothing but the telemetry store (HTTP only) and the
//! shutdown channel; a failure in one task is logged and does not stop
//! the other.

use std::net::SocketAddr;
use std::sync::Arc;

use nepserver::TelemetryStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::bridge::NotificationBridge;
use crate::config::{GatewayConfig, HttpConfig};
use crate::dns::DnsServer;
use crate::error::{GatewayError, Result};
use crate::http::{self, AppState};

/// Bound listeners, ready to run
pub struct Gateway {
    http_config: HttpConfig,
    listener: TcpListener,
    dns: Option<DnsServer>,
    store: Arc<TelemetryStore>,
    bridge: Option<NotificationBridge>,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    /// Bind every listener and connect the bridge
    ///
    /// Bind failures are returned; an unreachable broker only disables
    /// the bridge.
    pub async fn bind(config: GatewayConfig) -> Result<Self> {
        config.http.validate()?;

        let listener = TcpListener::bind(config.http.listen)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.http.listen,
                source,
            })?;

        let dns = match config.dns {
            Some(dns_config) => Some(DnsServer::bind(dns_config).await?),
            None => {
                info!("DNS resolver disabled");
                None
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bridge = match config.bridge {
            Some(bridge_config) => match NotificationBridge::connect(bridge_config, shutdown_rx)
                .await
            {
                Ok(bridge) => Some(bridge),
                Err(e) => {
                    warn!(error = %e, "continuing without MQTT bridge");
                    None
                }
            },
            None => {
                info!("MQTT bridge not configured");
                None
            }
        };

        Ok(Self {
            http_config: config.http,
            listener,
            dns,
            store: Arc::new(TelemetryStore::new()),
            bridge,
            shutdown_tx,
        })
    }

    /// HTTP address actually bound
    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// DNS address actually bound, if the resolver is enabled
    pub fn dns_addr(&self) -> Option<SocketAddr> {
        self.dns.as_ref().and_then(|dns| dns.local_addr().ok())
    }

    /// Shared telemetry store
    pub fn store(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.store)
    }

    /// Run both listeners until `signal` resolves
    pub async fn run<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let Gateway {
            http_config,
            listener,
            dns,
            store,
            bridge,
            shutdown_tx,
        } = self;

        let dns_task = dns.map(|dns| {
            let rx = shutdown_tx.subscribe();
            tokio::spawn(async move { report("DNS resolver", dns.run(rx).await) })
        });

        let state = Arc::new(AppState::new(store, bridge));
        let http_rx = shutdown_tx.subscribe();
        let http_task = tokio::spawn(async move {
            report(
                "HTTP ingress",
                http::serve(listener, state, &http_config, http_rx).await,
            )
        });

        signal.await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);

        if let Some(task) = dns_task {
            if let Err(e) = task.await {
                error!(listener = "DNS resolver", error = %e, "listener task panicked");
            }
        }
        if let Err(e) = http_task.await {
            error!(listener = "HTTP ingress", error = %e, "listener task panicked");
        }
        Ok(())
    }
}

fn report(name: &str, outcome: Result<()>) {
    if let Err(e) = outcome {
        error!(listener = name, error = %e, "listener failed");
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
