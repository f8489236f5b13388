//! # Connection Establisher
//!
//! Settles the session on zero or one active endpoint.
//!
//! A call to [`Connector::establish`] runs up to `maxRetries` rounds, pausing
//! `retryDelayMs` between them, all under one overall deadline. Each round
//! tries, in order:
//!
//! 1. the manual override, when enabled (no discovery unless `manualFallback`);
//! 2. otherwise the last-known-good endpoint from the store;
//! 3. a full subnet sweep, verifying reachable hosts by ascending host octet
//!    until the first one answers.
//!
//! Only one round runs at a time; a concurrent call returns
//! [`EstablishError::InProgress`] without touching the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use linkr_common::config::Config;
use linkr_common::endpoint::Endpoint;
use linkr_common::network::gateway::{GatewayError, GatewaySource};
use linkr_common::network::subnet::{self, RawAddress};
use linkr_common::store::{EndpointStore, StoreError};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::link::{Link, Outcome};
use crate::scanner::{ScanProgress, SubnetScanner};
use crate::session::{ConnectionState, Session, SessionEvent};

/// Grace on top of the probe timeout for the OS to tear the socket down.
const PROBE_SLACK: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum EstablishError {
    #[error("an establishment round is already running")]
    InProgress,
    #[error("no endpoint answered after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("no endpoint answered within {0:?}")]
    TimedOut(Duration),
    #[error("{0} is not a valid IPv4 host")]
    InvalidHost(String),
    #[error(transparent)]
    NoNetwork(#[from] GatewayError),
    #[error("round was superseded by a reset")]
    Superseded,
}

/// Why a single round produced no endpoint.
#[derive(Debug)]
enum RoundFailure {
    NothingReachable,
    InvalidHost(String),
    NoNetwork(GatewayError),
    Superseded,
}

pub struct Connector {
    session: Arc<Session>,
    link: Arc<dyn Link>,
    store: Arc<dyn EndpointStore>,
    gateway: Arc<dyn GatewaySource>,
    config: Config,
    round_guard: Mutex<()>,
    probes: AtomicUsize,
}

impl Connector {
    pub fn new(
        config: Config,
        link: Arc<dyn Link>,
        store: Arc<dyn EndpointStore>,
        gateway: Arc<dyn GatewaySource>,
    ) -> Self {
        Self {
            session: Arc::new(Session::new()),
            link,
            store,
            gateway,
            config,
            round_guard: Mutex::new(()),
            probes: AtomicUsize::new(0),
        }
    }

    /// Read-only view for collaborators.
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A dispatcher sharing this connector's session, link and store.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.session),
            Arc::clone(&self.link),
            Arc::clone(&self.store),
            &self.config,
        )
    }

    /// Number of verification probes issued through [`Self::test_connection`].
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    pub async fn establish(&self) -> Result<Endpoint, EstablishError> {
        let Ok(_guard) = self.round_guard.try_lock() else {
            debug!("establish requested while a round is running");
            return Err(EstablishError::InProgress);
        };

        if let ConnectionState::Connected(current) = self.session.state() {
            if self.test_connection(&current).await.is_reachable() {
                debug!(endpoint = %current, "already connected");
                return Ok(current);
            }
            info!(endpoint = %current, "connected endpoint stopped answering");
        }

        let generation: u64 = self.session.begin_round();
        let deadline: Duration = self.config.establish_timeout();

        let result = match tokio::time::timeout(deadline, self.run_rounds(generation)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(?deadline, "establishment deadline reached");
                Err(EstablishError::TimedOut(deadline))
            }
        };

        match &result {
            Ok(endpoint) => {
                info!(%endpoint, "connection established");
                match self
                    .session
                    .commit_if_current(generation, || self.store.save(endpoint))
                {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!("could not persist endpoint: {e}"),
                    None => {
                        debug!(%endpoint, "reset after connecting, not persisting");
                        return Err(EstablishError::Superseded);
                    }
                }
            }
            Err(EstablishError::Superseded) => {}
            Err(e) => {
                warn!("connection failed: {e}");
                self.session.transition(generation, ConnectionState::Failed);
            }
        }
        result
    }

    /// Forgets the stored endpoint and all session state.
    ///
    /// A round still running when this is called will not commit.
    pub fn reset(&self) -> Result<(), StoreError> {
        info!("resetting connection state");
        self.session.reset();
        self.store.clear()
    }

    /// Bounded probe used for every verification step, counted and published.
    pub async fn test_connection(&self, endpoint: &Endpoint) -> Outcome {
        let limit: Duration = self.config.probe_timeout();
        let outcome = tokio::time::timeout(limit + PROBE_SLACK, self.link.probe(endpoint, limit))
            .await
            .unwrap_or(Outcome::TimedOut);

        self.probes.fetch_add(1, Ordering::Relaxed);
        debug!(%endpoint, %outcome, "connection test");
        self.session.emit(SessionEvent::ProbeFinished {
            endpoint: endpoint.clone(),
            outcome,
        });
        outcome
    }

    async fn run_rounds(&self, generation: u64) -> Result<Endpoint, EstablishError> {
        let max: u32 = self.config.max_retries.max(1);
        let mut last_failure = RoundFailure::NothingReachable;

        for attempt in 1..=max {
            if !self
                .session
                .transition(generation, ConnectionState::Connecting { attempt })
            {
                return Err(EstablishError::Superseded);
            }
            info!(attempt, max, "establishment round");

            match self.round(generation).await {
                Ok(endpoint) => return Ok(endpoint),
                Err(RoundFailure::InvalidHost(host)) => return Err(EstablishError::InvalidHost(host)),
                Err(RoundFailure::Superseded) => return Err(EstablishError::Superseded),
                Err(failure) => {
                    debug!(attempt, ?failure, "round failed");
                    last_failure = failure;
                }
            }

            if attempt < max {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        Err(match last_failure {
            RoundFailure::NoNetwork(e) => EstablishError::NoNetwork(e),
            _ => EstablishError::RetriesExhausted { attempts: max },
        })
    }

    async fn round(&self, generation: u64) -> Result<Endpoint, RoundFailure> {
        if let Some(manual) = self.config.manual_override() {
            match self.test_connection(&manual).await {
                Outcome::Reachable => return self.settle(generation, manual),
                Outcome::InvalidHost => {
                    return Err(RoundFailure::InvalidHost(manual.address().to_string()));
                }
                outcome if !self.config.manual_fallback => {
                    debug!(endpoint = %manual, %outcome, "manual endpoint unavailable");
                    return Err(RoundFailure::NothingReachable);
                }
                outcome => {
                    info!(endpoint = %manual, %outcome, "manual endpoint unavailable, discovering");
                }
            }
        } else if let Some(saved) = self.last_known_good() {
            if self.test_connection(&saved).await.is_reachable() {
                return self.settle(generation, saved);
            }
            debug!(endpoint = %saved, "stored endpoint did not answer");
        }

        self.discover(generation).await
    }

    async fn discover(&self, generation: u64) -> Result<Endpoint, RoundFailure> {
        let gateway: RawAddress = self.gateway.gateway().map_err(RoundFailure::NoNetwork)?;
        let candidates: Vec<Endpoint> = subnet::candidates(gateway, self.config.port);
        if candidates.is_empty() {
            warn!(gateway = %gateway.to_ipv4(), "gateway does not anchor a usable subnet");
            return Err(RoundFailure::NothingReachable);
        }

        self.session.emit(SessionEvent::ScanStarted {
            candidates: candidates.len(),
        });

        let session = Arc::clone(&self.session);
        let scanner = SubnetScanner::from_config(Arc::clone(&self.link), &self.config).with_progress(
            Arc::new(move |progress: ScanProgress| {
                session.emit(SessionEvent::ScanProgress(progress));
            }),
        );
        let reachable = scanner.scan(candidates, self.config.probe_timeout()).await;

        self.session.emit(SessionEvent::ScanFinished {
            reachable: reachable.len(),
        });

        if !self.session.replace_candidates(generation, reachable.clone()) {
            return Err(RoundFailure::Superseded);
        }

        for endpoint in reachable {
            if self.test_connection(&endpoint).await.is_reachable() {
                return self.settle(generation, endpoint);
            }
        }
        Err(RoundFailure::NothingReachable)
    }

    fn settle(&self, generation: u64, endpoint: Endpoint) -> Result<Endpoint, RoundFailure> {
        if self.session.settle(generation, endpoint.clone()) {
            Ok(endpoint)
        } else {
            Err(RoundFailure::Superseded)
        }
    }

    fn last_known_good(&self) -> Option<Endpoint> {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("ignoring unreadable endpoint store: {e}");
                None
            }
        };

        if stored.is_none() && self.session.take_first_run() {
            self.session.emit(SessionEvent::FirstRun);
        }
        stored
    }
}
