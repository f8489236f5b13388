use std::sync::Arc;

use linkr_core::session::{ConnectionState, Session, SessionEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::terminal::{format, spinner};

/// Mirrors session events onto the spinner until the session is dropped or
/// the returned task is aborted.
pub fn follow(session: &Arc<Session>, max_retries: u32) -> JoinHandle<()> {
    let mut events = session.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => render(event, max_retries),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "progress display fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn render(event: SessionEvent, max_retries: u32) {
    match event {
        SessionEvent::StateChanged(ConnectionState::Connecting { attempt }) => {
            spinner::set_message(format!("Connecting (attempt {attempt}/{max_retries})"));
        }
        SessionEvent::StateChanged(_) => {}
        SessionEvent::FirstRun => {
            warn!("No saved receiver yet, searching the local network");
        }
        SessionEvent::ScanStarted { candidates } => {
            spinner::set_message(format!("Sweeping {candidates} addresses"));
        }
        SessionEvent::ScanProgress(p) => {
            spinner::set_message(format!(
                "Sweeping {}/{} addresses, {} answered",
                p.probed, p.total, p.reachable
            ));
        }
        SessionEvent::ScanFinished { reachable } => {
            debug!(reachable, "sweep finished");
        }
        SessionEvent::ProbeFinished { endpoint, outcome } => {
            spinner::set_message(format!(
                "Checked {}: {}",
                format::endpoint(&endpoint),
                format::outcome(outcome)
            ));
        }
        SessionEvent::SendAttempt { endpoint, attempt } => {
            spinner::set_message(format!(
                "Sending to {}: {}",
                format::endpoint(&endpoint),
                format::attempt(&attempt)
            ));
        }
        SessionEvent::SendFinished(_) => {}
    }
}
