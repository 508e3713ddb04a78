// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! DNS interception resolver
//!
//! Answers queries for one hostname with a local address so devices
//! report here instead of the vendor cloud. Everything else is forwarded
//! to an upstream resolver, or answered empty when forwarding is off.
//!
//! ```text
//! query ──► name == intercept? ──yes──► A <response_addr>, TTL 60
//!                 │
//!                 no ──► upstream? ──yes──► forward, copy answers
//!                            │                  (timeout: empty answer)
//!                            no ──► empty answer
//! ```

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DnsConfig;
use crate::error::{GatewayError, Result};

/// TTL of intercepted answers, in seconds
pub const INTERCEPT_TTL: u32 = 60;

/// Largest datagram accepted from clients or upstream
const MAX_DATAGRAM: usize = 4096;

/// Builds responses for individual queries
#[derive(Debug, Clone)]
pub struct DnsInterceptor {
    config: DnsConfig,
    intercept_name: String,
}

impl DnsInterceptor {
    /// Create an interceptor
    pub fn new(config: DnsConfig) -> Self {
        let intercept_name = normalize(&config.intercept_name);
        Self {
            config,
            intercept_name,
        }
    }

    /// True if `name` is the intercepted hostname, ignoring case and the trailing dot
    pub fn is_intercepted(&self, name: &Name) -> bool {
        normalize(&name.to_ascii()) == self.intercept_name
    }

    /// Answer one raw query datagram
    pub async fn handle(&self, packet: &[u8]) -> Result<Vec<u8>> {
        let request = Message::from_vec(packet)?;
        let response = self.resolve(&request, packet).await;
        Ok(response.to_vec()?)
    }

    /// Build the response to a parsed request; `packet` is its wire form
    pub async fn resolve(&self, request: &Message, packet: &[u8]) -> Message {
        let mut response = response_for(request);

        let Some(query) = request.queries().first() else {
            return response;
        };

        if self.is_intercepted(query.name()) {
            debug!(name = %query.name(), addr = %self.config.response_addr, "intercepted");
            response.add_answer(Record::from_rdata(
                query.name().clone(),
                INTERCEPT_TTL,
                RData::A(A::from(self.config.response_addr)),
            ));
            return response;
        }

        let Some(upstream) = self.config.upstream else {
            return response;
        };

        match self.forward(upstream, request.id(), packet).await {
            Ok(reply) => {
                response.set_response_code(reply.response_code());
                response.add_answers(reply.answers().iter().cloned());
            }
            Err(e) => {
                warn!(name = %query.name(), %upstream, error = %e, "forwarding failed");
            }
        }
        response
    }

    /// Send the query verbatim to `upstream` and wait for the matching reply
    async fn forward(&self, upstream: SocketAddr, id: u16, packet: &[u8]) -> Result<Message> {
        let timeout = self.config.upstream_timeout;
        match tokio::time::timeout(timeout, exchange(upstream, id, packet)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(GatewayError::UpstreamDnsFailure(e.to_string())),
            Err(_) => Err(GatewayError::UpstreamDnsFailure(format!(
                "no reply from {} within {:?}",
                upstream, timeout
            ))),
        }
    }
}

async fn exchange(upstream: SocketAddr, id: u16, packet: &[u8]) -> Result<Message> {
    let bind = match upstream {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(upstream).await?;
    socket.send(packet).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let len = socket.recv(&mut buf).await?;
        let reply = Message::from_vec(&buf[..len])?;
        if reply.id() == id && reply.message_type() == MessageType::Response {
            return Ok(reply);
        }
        debug!(%upstream, id = reply.id(), "ignoring unrelated upstream reply");
    }
}

/// Response skeleton: same id and question, authoritative, recursion available
fn response_for(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_authoritative(true)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true);
    response.add_queries(request.queries().iter().cloned());
    response
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// UDP listener loop around a [`DnsInterceptor`]
pub struct DnsServer {
    socket: Arc<UdpSocket>,
    interceptor: Arc<DnsInterceptor>,
}

impl DnsServer {
    /// Bind the configured listen address
    pub async fn bind(config: DnsConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.listen)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self {
            socket: Arc::new(socket),
            interceptor: Arc::new(DnsInterceptor::new(config)),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until `shutdown` flips to true
    ///
    /// Each datagram is answered on its own task so a slow upstream never
    /// delays other queries. Per-query failures are logged and dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(addr = %self.local_addr()?, "DNS resolver listening");
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(error = %e, "DNS receive failed");
                            continue;
                        }
                    };
                    let packet = buf[..len].to_vec();
                    let socket = Arc::clone(&self.socket);
                    let interceptor = Arc::clone(&self.interceptor);
                    tokio::spawn(async move {
                        match interceptor.handle(&packet).await {
                            Ok(reply) => {
                                if let Err(e) = socket.send_to(&reply, peer).await {
                                    warn!(%peer, error = %e, "DNS send failed");
                                }
                            }
                            Err(e) => debug!(%peer, error = %e, "dropping malformed query"),
                        }
                    });
                }
            }
        }

        info!("DNS resolver stopped");
        Ok(())
    }
}
