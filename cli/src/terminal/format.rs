use crate::terminal::colors;
use colored::*;
use linkr_common::endpoint::Endpoint;
use linkr_core::dispatch::Attempt;
use linkr_core::link::Outcome;

pub fn endpoint(endpoint: &Endpoint) -> ColoredString {
    let address: ColoredString = endpoint.address().color(colors::IPV4_ADDR);
    let port: ColoredString = endpoint.port().to_string().color(colors::PORT);
    format!("{address}{}{port}", ":".color(colors::SEPARATOR)).normal()
}

pub fn outcome(outcome: Outcome) -> ColoredString {
    let text: String = outcome.to_string();
    match outcome {
        Outcome::Reachable => text.color(colors::PRIMARY),
        Outcome::TimedOut => text.color(colors::ACCENT),
        Outcome::Refused | Outcome::Unreachable | Outcome::InvalidHost => {
            text.color(colors::FAILURE)
        }
    }
}

pub fn attempt(attempt: &Attempt) -> ColoredString {
    match attempt {
        Attempt::Sent => "sent".color(colors::PRIMARY).bold(),
        Attempt::Rejected(o) => format!("rejected ({})", outcome(*o)).normal(),
        Attempt::Failed(o) => format!("write failed ({})", outcome(*o)).normal(),
    }
}

pub fn attempts_to_detail(attempts: &[(Endpoint, Attempt)]) -> Vec<(String, ColoredString)> {
    attempts
        .iter()
        .map(|(ep, result)| (ep.address().to_string(), attempt(result)))
        .collect()
}

pub fn millis(ms: u64) -> ColoredString {
    if ms >= 1000 && ms % 1000 == 0 {
        format!("{}s", ms / 1000).color(colors::ACCENT)
    } else {
        format!("{ms}ms").color(colors::ACCENT)
    }
}
