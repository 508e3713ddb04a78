// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the gateway
//!
//! Plain structs with defaults for library use, plus the [`Args`] parser
//! the binary reads from the command line and `NEP_*` environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Parser;

use crate::error::{GatewayError, Result};

/// Hostname the device firmware reports to
pub const DEFAULT_INTERCEPT_NAME: &str = "www.nepviewer.net";

/// Path the device firmware POSTs frames to
pub const DEFAULT_INGRESS_PATH: &str = "/i.php";

/// HTTP listener and routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Listen address
    pub listen: SocketAddr,
    /// Route accepting device frames
    pub ingress_path: String,
    /// OpenMetrics route
    pub metrics_path: String,
    /// JSON snapshot route
    pub json_path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ingress_path: DEFAULT_INGRESS_PATH.to_string(),
            metrics_path: "/metrics".to_string(),
            json_path: "/json".to_string(),
        }
    }
}

impl HttpConfig {
    /// Check that routes are absolute and distinct
    pub fn validate(&self) -> Result<()> {
        let paths = [&self.ingress_path, &self.metrics_path, &self.json_path];
        for path in paths {
            if !path.starts_with('/') {
                return Err(GatewayError::InvalidConfig(format!(
                    "route {:?} must start with '/'",
                    path
                )));
            }
        }
        if paths[0] == paths[1] || paths[0] == paths[2] || paths[1] == paths[2] {
            return Err(GatewayError::InvalidConfig(
                "ingress, metrics and json routes must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// DNS interception resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    /// UDP listen address
    pub listen: SocketAddr,
    /// Name answered locally
    pub intercept_name: String,
    /// Address returned for `intercept_name`
    pub response_addr: Ipv4Addr,
    /// Resolver for every other name; `None` answers them empty
    pub upstream: Option<SocketAddr>,
    /// Deadline for one upstream exchange
    pub upstream_timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 53)),
            intercept_name: DEFAULT_INTERCEPT_NAME.to_string(),
            response_addr: Ipv4Addr::LOCALHOST,
            upstream: Some(SocketAddr::from(([1, 1, 1, 1], 53))),
            upstream_timeout: Duration::from_secs(1),
        }
    }
}

/// MQTT bridge and Home Assistant discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Optional credentials
    pub username: Option<String>,
    pub password: Option<String>,
    /// Namespace of state and diagnostic topics
    pub topic_prefix: String,
    /// Home Assistant discovery prefix
    pub discovery_prefix: String,
    /// Device manufacturer in discovery documents
    pub manufacturer: String,
    /// Device model in discovery documents
    pub model: String,
    /// Time after which Home Assistant marks a silent sensor unavailable
    pub expire_after: Duration,
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Deadline for the initial broker handshake
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic_prefix: "nepserver".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            manufacturer: "Northern Electric Power".to_string(),
            model: "Micro Inverter".to_string(),
            expire_after: Duration::from_secs(300),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    pub http: HttpConfig,
    /// `None` disables the resolver
    pub dns: Option<DnsConfig>,
    /// `None` disables the bridge
    pub bridge: Option<BridgeConfig>,
}

/// NEP micro-inverter gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// HTTP listen address
    #[arg(long, env = "NEP_LISTEN_ADDR", default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// HTTP listen port
    #[arg(long, env = "NEP_LISTEN_PORT", default_value = "8080")]
    pub listen_port: u16,

    /// Route accepting device frames
    #[arg(long, env = "NEP_INGRESS_PATH", default_value = DEFAULT_INGRESS_PATH)]
    pub ingress_path: String,

    /// OpenMetrics route
    #[arg(long, env = "NEP_METRICS_PATH", default_value = "/metrics")]
    pub metrics_path: String,

    /// JSON snapshot route
    #[arg(long, env = "NEP_JSON_PATH", default_value = "/json")]
    pub json_path: String,

    /// DNS listen address
    #[arg(long, env = "NEP_DNS_LISTEN", default_value = "0.0.0.0:53")]
    pub dns_listen: SocketAddr,

    /// Hostname answered locally
    #[arg(long, env = "NEP_DNS_NAME", default_value = DEFAULT_INTERCEPT_NAME)]
    pub dns_name: String,

    /// Address returned for the intercepted hostname
    #[arg(long, env = "NEP_DNS_RESPONSE_ADDR", default_value = "127.0.0.1")]
    pub dns_response_addr: Ipv4Addr,

    /// Upstream resolver for all other names
    #[arg(long, env = "NEP_DNS_UPSTREAM", default_value = "1.1.1.1:53")]
    pub dns_upstream: SocketAddr,

    /// Answer other names with an empty response instead of forwarding
    #[arg(long, env = "NEP_DNS_NO_FORWARD", value_parser = BoolishValueParser::new())]
    pub dns_no_forward: bool,

    /// Do not start the DNS resolver
    #[arg(long, env = "NEP_NO_DNS", value_parser = BoolishValueParser::new())]
    pub no_dns: bool,

    /// MQTT broker host; the bridge is disabled when unset
    #[arg(long, env = "NEP_MQTT_HOST")]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "NEP_MQTT_PORT", default_value = "1883")]
    pub mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "NEP_MQTT_USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long, env = "NEP_MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// Home Assistant discovery prefix
    #[arg(long, env = "NEP_DISCOVERY_PREFIX", default_value = "homeassistant")]
    pub discovery_prefix: String,

    /// Manufacturer shown in Home Assistant
    #[arg(long, env = "NEP_MANUFACTURER", default_value = "Northern Electric Power")]
    pub manufacturer: String,

    /// Model shown in Home Assistant
    #[arg(long, env = "NEP_MODEL", default_value = "Micro Inverter")]
    pub model: String,

    /// Seconds without a report before Home Assistant marks the sensor unavailable
    #[arg(long, env = "NEP_EXPIRE_AFTER", default_value = "300")]
    pub expire_after: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NEP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Build the gateway configuration
    pub fn into_config(self) -> Result<GatewayConfig> {
        let http = HttpConfig {
            listen: SocketAddr::new(self.listen_addr, self.listen_port),
            ingress_path: self.ingress_path,
            metrics_path: self.metrics_path,
            json_path: self.json_path,
        };
        http.validate()?;

        let dns = (!self.no_dns).then(|| DnsConfig {
            listen: self.dns_listen,
            intercept_name: self.dns_name,
            response_addr: self.dns_response_addr,
            upstream: (!self.dns_no_forward).then_some(self.dns_upstream),
            ..Default::default()
        });

        let bridge = self.mqtt_host.map(|host| BridgeConfig {
            host,
            port: self.mqtt_port,
            username: self.mqtt_user,
            password: self.mqtt_password,
            discovery_prefix: self.discovery_prefix,
            manufacturer: self.manufacturer,
            model: self.model,
            expire_after: Duration::from_secs(self.expire_after),
            ..Default::default()
        });

        Ok(GatewayConfig { http, dns, bridge })
    }
}
