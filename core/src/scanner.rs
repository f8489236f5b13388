//! # Subnet Scanner
//!
//! Fans a reachability [`probe`](crate::link::Link::probe) out over every
//! candidate endpoint and gathers the ones that answered.
//!
//! Probes complete in any order; results land in a [`BTreeSet`] so callers
//! always iterate reachable endpoints by ascending host octet. The sweep as a
//! whole is bounded by its own deadline: probes still pending when it fires
//! are aborted and their candidates count as unreachable.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use linkr_common::config::Config;
use linkr_common::endpoint::Endpoint;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::link::{Link, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub probed: usize,
    pub total: usize,
    pub reachable: usize,
}

pub type ProgressFn = Arc<dyn Fn(ScanProgress) + Send + Sync>;

pub struct SubnetScanner {
    link: Arc<dyn Link>,
    scan_timeout: Duration,
    concurrency: usize,
    on_progress: Option<ProgressFn>,
}

impl SubnetScanner {
    pub fn new(link: Arc<dyn Link>, scan_timeout: Duration, concurrency: usize) -> Self {
        Self {
            link,
            scan_timeout,
            concurrency: concurrency.clamp(1, Semaphore::MAX_PERMITS),
            on_progress: None,
        }
    }

    pub fn from_config(link: Arc<dyn Link>, cfg: &Config) -> Self {
        Self::new(link, cfg.scan_timeout(), cfg.scan_concurrency)
    }

    /// Invoked after every finished probe.
    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Probes every candidate and returns the reachable ones.
    ///
    /// Individual probe failures are never errors; a candidate that did not
    /// answer `Reachable` before the sweep deadline is simply left out.
    pub async fn scan(
        &self,
        candidates: impl IntoIterator<Item = Endpoint>,
        probe_timeout: Duration,
    ) -> BTreeSet<Endpoint> {
        let unique: BTreeSet<Endpoint> = candidates.into_iter().collect();
        let total: usize = unique.len();
        let deadline: Instant = Instant::now() + self.scan_timeout;

        info!(total, concurrency = self.concurrency, "sweeping candidates");

        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(Endpoint, Outcome)> = JoinSet::new();

        for endpoint in unique {
            let link = Arc::clone(&self.link);
            let limiter = Arc::clone(&limiter);

            tasks.spawn(async move {
                let outcome = match limiter.acquire_owned().await {
                    Ok(_permit) => link.probe(&endpoint, probe_timeout).await,
                    Err(_closed) => Outcome::Unreachable,
                };
                (endpoint, outcome)
            });
        }

        let mut reachable: BTreeSet<Endpoint> = BTreeSet::new();
        let mut probed: usize = 0;

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((endpoint, outcome)))) => {
                    probed += 1;
                    if outcome.is_reachable() {
                        debug!(%endpoint, "candidate answered");
                        reachable.insert(endpoint);
                    }
                    self.report(ScanProgress {
                        probed,
                        total,
                        reachable: reachable.len(),
                    });
                }
                Ok(Some(Err(e))) => {
                    probed += 1;
                    warn!("probe task failed: {e}");
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    warn!(abandoned = tasks.len(), "sweep deadline reached");
                    tasks.abort_all();
                    break;
                }
            }
        }

        info!(found = reachable.len(), total, "sweep finished");
        reachable
    }

    fn report(&self, progress: ScanProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLink;
    use linkr_common::network::subnet;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PROBE: Duration = Duration::from_millis(1_000);

    fn subnet_192() -> Vec<Endpoint> {
        subnet::candidates_for(Ipv4Addr::new(192, 168, 1, 1), 8000)
    }

    #[tokio::test]
    async fn single_listener_is_found() {
        let link = Arc::new(FakeLink::new().reachable(["192.168.1.42"]));
        let scanner = SubnetScanner::new(link.clone(), Duration::from_secs(5), 64);

        let found = scanner.scan(subnet_192(), PROBE).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found.first().unwrap().address(), "192.168.1.42");
        assert_eq!(link.total_probes(), 254);
    }

    #[tokio::test]
    async fn only_reachable_outcomes_are_kept() {
        let link = Arc::new(
            FakeLink::new()
                .reachable(["192.168.1.200", "192.168.1.3"])
                .outcome("192.168.1.4", Outcome::TimedOut)
                .outcome("192.168.1.5", Outcome::InvalidHost)
                .otherwise(Outcome::Unreachable),
        );
        let scanner = SubnetScanner::new(link, Duration::from_secs(5), 16);

        let found: Vec<String> = scanner
            .scan(subnet_192(), PROBE)
            .await
            .into_iter()
            .map(|e| e.address().to_string())
            .collect();

        assert_eq!(found, vec!["192.168.1.3", "192.168.1.200"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_deadline_abandons_slow_probes() {
        let link = Arc::new(
            FakeLink::new()
                .reachable(["192.168.1.3", "192.168.1.9"])
                .delay("192.168.1.9", Duration::from_secs(10)),
        );
        let scan_timeout = Duration::from_secs(2);
        let scanner = SubnetScanner::new(link, scan_timeout, 254);

        let started = Instant::now();
        let found = scanner.scan(subnet_192(), Duration::from_secs(30)).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found.first().unwrap().address(), "192.168.1.3");
        assert!(started.elapsed() <= scan_timeout + Duration::from_millis(50));
    }

    #[tokio::test]
    async fn concurrency_cap_does_not_change_results() {
        let link = Arc::new(FakeLink::new().reachable(["192.168.1.10", "192.168.1.77"]));

        let wide = SubnetScanner::new(link.clone(), Duration::from_secs(5), 254)
            .scan(subnet_192(), PROBE)
            .await;
        let narrow = SubnetScanner::new(link, Duration::from_secs(5), 1)
            .scan(subnet_192(), PROBE)
            .await;

        assert_eq!(wide, narrow);
    }

    #[tokio::test]
    async fn duplicates_are_probed_once_and_progress_is_reported() {
        let link = Arc::new(FakeLink::new().reachable(["10.0.0.2"]));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let scanner = SubnetScanner::new(link.clone(), Duration::from_secs(5), 4).with_progress(
            Arc::new(move |p: ScanProgress| {
                assert_eq!(p.total, 2);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let candidates = ["10.0.0.2", "10.0.0.3", "10.0.0.2"]
            .into_iter()
            .map(|a| Endpoint::new(a, 8000));
        let found = scanner.scan(candidates, PROBE).await;

        assert_eq!(found.len(), 1);
        assert_eq!(link.total_probes(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_concurrency_is_clamped() {
        let link = Arc::new(FakeLink::new().reachable(["192.168.1.42"]));
        let scanner = SubnetScanner::new(link, Duration::from_secs(5), usize::MAX);

        let found = scanner.scan(subnet_192(), PROBE).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_empty_set() {
        let scanner = SubnetScanner::new(Arc::new(FakeLink::new()), Duration::from_secs(1), 4);
        assert!(scanner.scan(Vec::new(), PROBE).await.is_empty());
    }
}
