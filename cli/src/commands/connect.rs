use std::time::{Duration, Instant};

use colored::*;
use linkr_common::endpoint::Endpoint;
use linkr_core::establish::{Connector, EstablishError};

use crate::terminal::{colors, format, print, progress, spinner};

/// Runs establishment behind the spinner and returns the settled endpoint.
pub async fn establish(connector: &Connector) -> Result<Endpoint, EstablishError> {
    let cfg = connector.config();
    let follower = progress::follow(&connector.session(), cfg.max_retries);
    spinner::start("Looking for a receiver");

    let result = connector.establish().await;

    follower.abort();
    spinner::stop();
    result
}

pub async fn connect(connector: &Connector, quiet: bool) -> anyhow::Result<()> {
    print::header("locating receiver", quiet);

    let start_time: Instant = Instant::now();
    match establish(connector).await {
        Ok(endpoint) => {
            connected(&endpoint, connector.probe_count(), start_time.elapsed(), quiet);
            Ok(())
        }
        Err(e) => {
            not_connected(quiet);
            Err(e.into())
        }
    }
}

fn connected(endpoint: &Endpoint, probes: usize, total_time: Duration, quiet: bool) {
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: String = format!(
        "{} {} {} {total_time}",
        "Connected to".color(colors::TEXT_DEFAULT),
        format::endpoint(endpoint),
        "in".color(colors::TEXT_DEFAULT)
    );

    if quiet {
        print::print(&output);
        return;
    }

    print::field("Receiver", format::endpoint(endpoint));
    print::field("Probes", probes.to_string().color(colors::ACCENT));
    print::fat_separator();
    print::centered(&output);
}

pub fn not_connected(quiet: bool) {
    if quiet {
        return;
    }
    print::header("no receiver found", quiet);
    print::no_results();
    print::recovery_hints();
}
