// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # NEP Gateway
//!
//! Local replacement for the NEP micro-inverter cloud endpoint.
//!
//! ## Usage
//!
//! ```bash
//! # Intercept DNS and answer with this host's LAN address
//! nepserver-gateway --dns-response-addr 192.168.1.10
//!
//! # HTTP only, with an MQTT bridge
//! nepserver-gateway --no-dns --mqtt-host broker.lan
//! ```

use clap::Parser;
use nepserver_gateway::{shutdown_signal, Args, Gateway, GatewayError};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("NEP Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let gateway = match Gateway::bind(config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("{}", e);
            if let GatewayError::Bind { addr, .. } = &e {
                if addr.port() < 1024 {
                    error!(
                        "port {} is privileged and needs CAP_NET_BIND_SERVICE",
                        addr.port()
                    );
                }
            }
            std::process::exit(1);
        }
    };

    match gateway.http_addr() {
        Ok(addr) => info!("Ingress and metrics on http://{}", addr),
        Err(e) => error!("Failed to read HTTP address: {}", e),
    }
    if let Some(addr) = gateway.dns_addr() {
        info!("DNS resolver on udp://{}", addr);
    }

    if let Err(e) = gateway.run(shutdown_signal()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
