//! Scripted [`Link`] double shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use linkr_common::endpoint::Endpoint;

use crate::link::{DeliveryError, Link, Outcome};

pub(crate) struct FakeLink {
    outcomes: Mutex<HashMap<String, Outcome>>,
    delays: HashMap<String, Duration>,
    default_outcome: Outcome,
    broken_writes: HashSet<String>,
    probes: Mutex<Vec<String>>,
    deliveries: Mutex<Vec<(String, String)>>,
}

impl FakeLink {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            default_outcome: Outcome::Refused,
            broken_writes: HashSet::new(),
            probes: Mutex::new(Vec::new()),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn reachable<'a>(self, addrs: impl IntoIterator<Item = &'a str>) -> Self {
        for addr in addrs {
            self.set(addr, Outcome::Reachable);
        }
        self
    }

    pub fn outcome(self, addr: &str, outcome: Outcome) -> Self {
        self.set(addr, outcome);
        self
    }

    pub fn otherwise(mut self, outcome: Outcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    pub fn delay(mut self, addr: &str, delay: Duration) -> Self {
        self.delays.insert(addr.to_string(), delay);
        self
    }

    pub fn broken_write(mut self, addr: &str) -> Self {
        self.broken_writes.insert(addr.to_string());
        self
    }

    pub fn set(&self, addr: &str, outcome: Outcome) {
        self.outcomes.lock().unwrap().insert(addr.to_string(), outcome);
    }

    pub fn probes_of(&self, addr: &str) -> usize {
        self.probes.lock().unwrap().iter().filter(|a| *a == addr).count()
    }

    pub fn total_probes(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().unwrap().clone()
    }

    fn outcome_of(&self, addr: &str) -> Outcome {
        self.outcomes
            .lock()
            .unwrap()
            .get(addr)
            .copied()
            .unwrap_or(self.default_outcome)
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Outcome {
        self.probes.lock().unwrap().push(endpoint.address().to_string());

        if let Some(delay) = self.delays.get(endpoint.address()) {
            if *delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Outcome::TimedOut;
            }
            tokio::time::sleep(*delay).await;
        }
        self.outcome_of(endpoint.address())
    }

    async fn deliver(
        &self,
        endpoint: &Endpoint,
        text: &str,
        _timeout: Duration,
    ) -> Result<(), DeliveryError> {
        let outcome = self.outcome_of(endpoint.address());
        if !outcome.is_reachable() {
            return Err(DeliveryError::Connect(outcome));
        }
        if self.broken_writes.contains(endpoint.address()) {
            return Err(DeliveryError::Write(std::io::ErrorKind::BrokenPipe.into()));
        }

        self.deliveries
            .lock()
            .unwrap()
            .push((endpoint.address().to_string(), text.to_string()));
        Ok(())
    }
}
