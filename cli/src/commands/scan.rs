use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::*;
use linkr_common::config::Config;
use linkr_common::endpoint::Endpoint;
use linkr_common::network::subnet::{self, RawAddress};
use linkr_core::network::tcp::TcpLink;
use linkr_core::scanner::{ScanProgress, SubnetScanner};
use tracing::info;

use crate::commands;
use crate::terminal::{colors, format, print, spinner};

pub async fn scan(cfg: &Config, quiet: bool) -> anyhow::Result<()> {
    let gateway: RawAddress = commands::gateway_source(cfg)
        .gateway()
        .context("locating the local subnet")?;
    let candidates: Vec<Endpoint> = subnet::candidates(gateway, cfg.port);
    if candidates.is_empty() {
        anyhow::bail!("{} does not anchor a usable subnet", gateway.to_ipv4());
    }

    print::header("sweeping subnet", quiet);
    if !quiet {
        print::field("Anchor", gateway.to_ipv4().to_string().color(colors::IPV4_ADDR));
        print::field("Port", cfg.port.to_string().color(colors::PORT));
        print::field("Timeout", format::millis(cfg.scan_timeout_ms));
    }
    info!("Probing {} addresses", candidates.len());

    let scanner = SubnetScanner::from_config(Arc::new(TcpLink), cfg).with_progress(Arc::new(
        |p: ScanProgress| {
            spinner::set_message(format!(
                "Sweeping {}/{} addresses, {} answered",
                p.probed, p.total, p.reachable
            ));
        },
    ));

    let start_time: Instant = Instant::now();
    spinner::start("Sweeping");
    let reachable: BTreeSet<Endpoint> = scanner.scan(candidates, cfg.probe_timeout()).await;
    spinner::stop();

    scan_ends(&reachable, start_time.elapsed(), quiet);
    Ok(())
}

fn scan_ends(reachable: &BTreeSet<Endpoint>, total_time: Duration, quiet: bool) {
    if reachable.is_empty() {
        print::header("zero receivers detected", quiet);
        print::no_results();
        return;
    }

    print::header("receivers", quiet);
    for (idx, endpoint) in reachable.iter().enumerate() {
        if quiet {
            print::print(&format::endpoint(endpoint).to_string());
            continue;
        }
        print::node(idx, endpoint.address());
        print::branches(&[
            ("Port".to_string(), endpoint.port().to_string().color(colors::PORT)),
            ("Status".to_string(), "reachable".color(colors::PRIMARY)),
        ]);
        if idx + 1 != reachable.len() {
            print::blank();
        }
    }

    if quiet {
        return;
    }

    let found: ColoredString = format!("{} receivers", reachable.len()).bold().green();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: String = format!(
        "{} {found} {} {total_time}",
        "Sweep complete:".color(colors::TEXT_DEFAULT),
        "found in".color(colors::TEXT_DEFAULT)
    );
    print::fat_separator();
    print::centered(&output);
}
