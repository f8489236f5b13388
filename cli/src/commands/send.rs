use colored::*;
use linkr_core::dispatch::{Delivery, DeliveryReport};
use linkr_core::establish::Connector;

use crate::commands::connect;
use crate::terminal::{colors, format, print, progress, spinner};

pub async fn send(connector: &Connector, text: &str, quiet: bool) -> anyhow::Result<()> {
    let manual = connector.config().manual_override();
    if manual.is_none() {
        print::header("locating receiver", quiet);
        if let Err(e) = connect::establish(connector).await {
            connect::not_connected(quiet);
            return Err(e.into());
        }
    }

    print::header("sending message", quiet);
    let follower = progress::follow(&connector.session(), connector.config().max_retries);
    spinner::start("Sending");

    let report: DeliveryReport = connector.dispatcher().send(text, manual.as_ref()).await;

    follower.abort();
    spinner::stop();

    print_report(&report, quiet);
    match report.delivery {
        Delivery::Sent(_) => Ok(()),
        Delivery::Rejected(endpoint) => anyhow::bail!("{endpoint} did not accept the message"),
        Delivery::NoEndpointAvailable => anyhow::bail!("no receiver accepted the message"),
    }
}

fn print_report(report: &DeliveryReport, quiet: bool) {
    if !quiet && !report.attempts.is_empty() {
        print::node(0, "Attempts");
        print::branches(&format::attempts_to_detail(&report.attempts));
        print::blank();
    }

    match &report.delivery {
        Delivery::Sent(endpoint) => {
            let output: String = format!(
                "{} {}",
                "Message delivered to".color(colors::TEXT_DEFAULT),
                format::endpoint(endpoint)
            );
            if quiet {
                print::print(&output);
            } else {
                print::fat_separator();
                print::centered(&output);
            }
        }
        Delivery::Rejected(_) | Delivery::NoEndpointAvailable => {
            if !quiet {
                print::recovery_hints();
            }
        }
    }
}
