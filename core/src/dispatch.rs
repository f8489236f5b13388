//! # Message Dispatcher
//!
//! Delivers one text payload to the first endpoint that still answers.
//!
//! With a manual override, either passed in or enabled in the [`Config`],
//! the payload goes to that endpoint or nowhere.
//! Otherwise the Candidate Set is walked in host-octet order, skipping anything
//! already refused this session; endpoints that fail verification or the
//! write are added to the Refused Set (per [`RefusalPolicy`]) but stay in the
//! Candidate Set so a reset can bring them back. A send that outlives a reset
//! neither refuses endpoints nor persists one.
//!
//! "Sent" means the bytes were handed to the transport. No acknowledgement is
//! read back.

use std::sync::Arc;
use std::time::Duration;

use linkr_common::config::{Config, RefusalPolicy};
use linkr_common::endpoint::Endpoint;
use linkr_common::store::EndpointStore;
use tracing::{debug, info, warn};

use crate::link::{Link, Outcome};
use crate::session::{Session, SessionEvent};

const PROBE_SLACK: Duration = Duration::from_millis(250);

/// Result of one endpoint's turn during a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Sent,
    /// Verification failed before any bytes were written.
    Rejected(Outcome),
    /// Verification passed but the write did not go through.
    Failed(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent(Endpoint),
    /// The manual override did not accept the payload.
    Rejected(Endpoint),
    NoEndpointAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: Vec<(Endpoint, Attempt)>,
    pub delivery: Delivery,
}

impl DeliveryReport {
    pub fn is_sent(&self) -> bool {
        matches!(self.delivery, Delivery::Sent(_))
    }

    pub fn sent_to(&self) -> Option<&Endpoint> {
        match &self.delivery {
            Delivery::Sent(endpoint) => Some(endpoint),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    session: Arc<Session>,
    link: Arc<dyn Link>,
    store: Arc<dyn EndpointStore>,
    probe_timeout: Duration,
    refusal_policy: RefusalPolicy,
    manual: Option<Endpoint>,
}

impl Dispatcher {
    pub fn new(
        session: Arc<Session>,
        link: Arc<dyn Link>,
        store: Arc<dyn EndpointStore>,
        config: &Config,
    ) -> Self {
        Self {
            session,
            link,
            store,
            probe_timeout: config.probe_timeout(),
            refusal_policy: config.refusal_policy,
            manual: config.manual_override(),
        }
    }

    /// `override_endpoint` takes precedence over the configured override.
    pub async fn send(&self, text: &str, override_endpoint: Option<&Endpoint>) -> DeliveryReport {
        let report = match override_endpoint.or(self.manual.as_ref()) {
            Some(endpoint) => self.send_manual(text, endpoint).await,
            None => self.send_auto(text).await,
        };

        self.session.emit(SessionEvent::SendFinished(report.clone()));
        report
    }

    async fn send_manual(&self, text: &str, endpoint: &Endpoint) -> DeliveryReport {
        let attempt = self.try_endpoint(text, endpoint).await;

        let delivery = if attempt == Attempt::Sent {
            Delivery::Sent(endpoint.clone())
        } else {
            warn!(%endpoint, ?attempt, "manual endpoint rejected the message");
            Delivery::Rejected(endpoint.clone())
        };

        DeliveryReport {
            attempts: vec![(endpoint.clone(), attempt)],
            delivery,
        }
    }

    async fn send_auto(&self, text: &str) -> DeliveryReport {
        let generation: u64 = self.session.current_generation();
        let mut attempts: Vec<(Endpoint, Attempt)> = Vec::new();

        for endpoint in self.session.candidates() {
            if self.session.is_refused(&endpoint) {
                debug!(%endpoint, "skipping refused endpoint");
                continue;
            }

            let attempt = self.try_endpoint(text, &endpoint).await;
            match attempt {
                Attempt::Sent => {
                    match self
                        .session
                        .commit_if_current(generation, || self.store.save(&endpoint))
                    {
                        Some(Ok(())) => {}
                        Some(Err(e)) => warn!("could not persist endpoint: {e}"),
                        None => debug!(%endpoint, "session was reset during send, not persisting"),
                    }
                    attempts.push((endpoint.clone(), attempt));
                    return DeliveryReport {
                        attempts,
                        delivery: Delivery::Sent(endpoint),
                    };
                }
                Attempt::Rejected(outcome) | Attempt::Failed(outcome) => {
                    self.refuse(generation, &endpoint, outcome);
                    attempts.push((endpoint, attempt));
                }
            }
        }

        warn!(tried = attempts.len(), "no endpoint available for delivery");
        DeliveryReport {
            attempts,
            delivery: Delivery::NoEndpointAvailable,
        }
    }

    /// Re-verifies `endpoint`, then writes the payload.
    async fn try_endpoint(&self, text: &str, endpoint: &Endpoint) -> Attempt {
        let verified = tokio::time::timeout(
            self.probe_timeout + PROBE_SLACK,
            self.link.probe(endpoint, self.probe_timeout),
        )
        .await
        .unwrap_or(Outcome::TimedOut);

        let attempt = if !verified.is_reachable() {
            debug!(%endpoint, outcome = %verified, "verification failed");
            Attempt::Rejected(verified)
        } else {
            match self.link.deliver(endpoint, text, self.probe_timeout).await {
                Ok(()) => {
                    info!(%endpoint, "message sent");
                    Attempt::Sent
                }
                Err(e) => {
                    warn!(%endpoint, "delivery failed: {e}");
                    Attempt::Failed(e.outcome())
                }
            }
        };

        self.session.emit(SessionEvent::SendAttempt {
            endpoint: endpoint.clone(),
            attempt: attempt.clone(),
        });
        attempt
    }

    fn refuse(&self, generation: u64, endpoint: &Endpoint, outcome: Outcome) {
        let remember = match self.refusal_policy {
            RefusalPolicy::AnyFailure => true,
            RefusalPolicy::ActiveRefusalOnly => {
                matches!(outcome, Outcome::Refused | Outcome::InvalidHost)
            }
        };

        if remember && self.session.mark_refused(generation, endpoint) {
            debug!(%endpoint, %outcome, "endpoint refused for this session");
        }
    }
}
