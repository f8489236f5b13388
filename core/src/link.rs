//! The seam between the engine and the wire.
//!
//! Everything above this module talks to peers through [`Link`], so the
//! establishment and dispatch logic can be driven by a scripted double in
//! tests while production uses [`TcpLink`](crate::network::tcp::TcpLink).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use linkr_common::endpoint::Endpoint;
use thiserror::Error;

/// Classified result of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Reachable,
    /// The peer actively rejected the connection.
    Refused,
    /// No route, host down, or any other connect failure.
    Unreachable,
    TimedOut,
    /// The address is malformed or does not resolve to IPv4.
    InvalidHost,
}

impl Outcome {
    pub fn is_reachable(self) -> bool {
        self == Outcome::Reachable
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::Reachable => "reachable",
            Outcome::Refused => "refused",
            Outcome::Unreachable => "unreachable",
            Outcome::TimedOut => "timed out",
            Outcome::InvalidHost => "invalid host",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not open connection: {0}")]
    Connect(Outcome),
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("write did not complete in time")]
    TimedOut,
}

impl DeliveryError {
    /// The probe-style classification of this failure.
    pub fn outcome(&self) -> Outcome {
        match self {
            DeliveryError::Connect(outcome) => *outcome,
            DeliveryError::Write(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Outcome::Refused
            }
            DeliveryError::Write(_) => Outcome::Unreachable,
            DeliveryError::TimedOut => Outcome::TimedOut,
        }
    }
}

#[async_trait]
pub trait Link: Send + Sync {
    /// Opens and immediately closes a connection, never exceeding `timeout`
    /// by more than the OS teardown.
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Outcome;

    /// Writes `text` as the entire connection payload, then closes.
    ///
    /// Success means the bytes were handed to the transport. Nothing is read
    /// back from the peer.
    async fn deliver(
        &self,
        endpoint: &Endpoint,
        text: &str,
        timeout: Duration,
    ) -> Result<(), DeliveryError>;
}
