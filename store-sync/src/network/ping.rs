//! TCP connect round trip measurement for store node addresses.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use multiaddr::{Multiaddr, Protocol};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{NetworkError, NetworkResult};
use crate::network::{NodeDirectory, PingResult};

/// Pings by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Default, Clone)]
pub struct TcpPingDirectory;

impl TcpPingDirectory {
    pub fn new() -> Self {
        Self
    }

    async fn ping_one(address: &str, timeout: Duration) -> PingResult {
        let target = match dial_target(address) {
            Ok(target) => target,
            Err(e) => return PingResult::failed(address, e.to_string()),
        };

        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => PingResult::reachable(address, started.elapsed()),
            Ok(Err(e)) => PingResult::failed(address, e.to_string()),
            Err(_) => PingResult::failed(address, NetworkError::Timeout.to_string()),
        }
    }
}

#[async_trait]
impl NodeDirectory for TcpPingDirectory {
    async fn ping(&self, addresses: &[String], timeout: Duration) -> Vec<PingResult> {
        let results = join_all(addresses.iter().map(|a| Self::ping_one(a, timeout))).await;
        for result in &results {
            if let Some(error) = &result.error {
                tracing::debug!("Ping {} failed: {}", result.address, error);
            }
        }
        results
    }
}

/// Turn a multiaddr (`/dns4/host/tcp/30303/p2p/...`) or enode
/// (`enode://key@host:port`) into a `host:port` string for `TcpStream::connect`.
pub fn dial_target(address: &str) -> NetworkResult<String> {
    if let Some(rest) = address.strip_prefix("enode://") {
        let (_, endpoint) = rest
            .split_once('@')
            .ok_or_else(|| NetworkError::AddressParse(format!("missing host in {}", address)))?;
        let endpoint = endpoint.split('?').next().unwrap_or(endpoint);
        if endpoint.rsplit_once(':').is_none() {
            return Err(NetworkError::AddressParse(format!("missing port in {}", address)));
        }
        return Ok(endpoint.to_string());
    }

    let multiaddr: Multiaddr =
        address.parse().map_err(|e| NetworkError::AddressParse(format!("{}: {}", address, e)))?;

    let mut host = None;
    let mut port = None;
    for protocol in multiaddr.iter() {
        match protocol {
            Protocol::Ip4(ip) => host = Some(ip.to_string()),
            Protocol::Ip6(ip) => host = Some(format!("[{}]", ip)),
            Protocol::Dns(name) | Protocol::Dns4(name) | Protocol::Dns6(name) => {
                host = Some(name.to_string())
            }
            Protocol::Tcp(p) => port = Some(p),
            _ => {}
        }
    }

    match (host, port) {
        (Some(host), Some(port)) => Ok(format!("{}:{}", host, port)),
        _ => Err(NetworkError::AddressParse(format!("no tcp endpoint in {}", address))),
    }
}
