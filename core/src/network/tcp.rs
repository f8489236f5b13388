use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use linkr_common::endpoint::Endpoint;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

use crate::link::{DeliveryError, Link, Outcome};

const MAX_HOSTNAME_LEN: usize = 253;

/// Production [`Link`] over plain TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpLink;

#[async_trait]
impl Link for TcpLink {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Outcome {
        probe(endpoint, timeout).await
    }

    async fn deliver(
        &self,
        endpoint: &Endpoint,
        text: &str,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        deliver(endpoint, text, timeout).await
    }
}

/// A single bounded connect to `endpoint`, closed straight away.
pub async fn probe(endpoint: &Endpoint, timeout: Duration) -> Outcome {
    let deadline: Instant = Instant::now() + timeout;

    let outcome = match connect(endpoint, deadline).await {
        Ok(_stream) => Outcome::Reachable,
        Err(outcome) => outcome,
    };
    trace!(%endpoint, %outcome, "probe finished");
    outcome
}

/// Sends `text` as the whole payload of one connection.
pub async fn deliver(endpoint: &Endpoint, text: &str, timeout: Duration) -> Result<(), DeliveryError> {
    let deadline: Instant = Instant::now() + timeout;
    let mut stream: TcpStream = connect(endpoint, deadline)
        .await
        .map_err(DeliveryError::Connect)?;

    let write = async {
        stream.write_all(text.as_bytes()).await?;
        stream.shutdown().await
    };

    match timeout_at(deadline, write).await {
        Ok(Ok(())) => {
            debug!(%endpoint, bytes = text.len(), "payload handed to transport");
            Ok(())
        }
        Ok(Err(e)) => Err(DeliveryError::Write(e)),
        Err(_elapsed) => Err(DeliveryError::TimedOut),
    }
}

async fn connect(endpoint: &Endpoint, deadline: Instant) -> Result<TcpStream, Outcome> {
    let socket_addr: SocketAddr = resolve(endpoint, deadline).await?;

    match timeout_at(deadline, TcpStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(classify(e.kind())),
        Err(_elapsed) => Err(Outcome::TimedOut),
    }
}

async fn resolve(endpoint: &Endpoint, deadline: Instant) -> Result<SocketAddr, Outcome> {
    if let Some(addr) = endpoint.socket_addr() {
        return Ok(addr);
    }
    if !is_plausible_hostname(endpoint.address()) {
        return Err(Outcome::InvalidHost);
    }

    let lookup = tokio::net::lookup_host((endpoint.address(), endpoint.port()));
    match timeout_at(deadline, lookup).await {
        Ok(Ok(mut addrs)) => addrs.find(SocketAddr::is_ipv4).ok_or(Outcome::InvalidHost),
        Ok(Err(_)) => Err(Outcome::InvalidHost),
        Err(_elapsed) => Err(Outcome::TimedOut),
    }
}

/// Rejects strings that could never resolve, such as `300.1.2.3` or text
/// with spaces, without touching the resolver.
fn is_plausible_hostname(host: &str) -> bool {
    let valid_chars = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    let numeric_only = host.chars().all(|c| c.is_ascii_digit() || c == '.');

    !host.is_empty()
        && host.len() <= MAX_HOSTNAME_LEN
        && valid_chars
        && !numeric_only
        && !host.starts_with(['-', '.'])
}

fn classify(kind: ErrorKind) -> Outcome {
    match kind {
        ErrorKind::ConnectionRefused => Outcome::Refused,
        ErrorKind::TimedOut => Outcome::TimedOut,
        _ => Outcome::Unreachable,
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
