use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK_RATE: Duration = Duration::from_millis(100);
const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

static SPINNER: Mutex<Option<ProgressBar>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<ProgressBar>> {
    SPINNER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shows the spinner with `msg`, replacing any running one.
pub fn start(msg: impl Into<String>) {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_strings(TICKS));
    }
    pb.enable_steady_tick(TICK_RATE);
    pb.set_message(msg.into());

    if let Some(old) = slot().replace(pb) {
        old.finish_and_clear();
    }
}

pub fn set_message(msg: impl Into<String>) {
    if let Some(pb) = slot().as_ref() {
        pb.set_message(msg.into());
    }
}

pub fn stop() {
    if let Some(pb) = slot().take() {
        pb.finish_and_clear();
    }
}

/// Routes log output around the spinner so lines never tear it.
pub struct SpinnerWriter;

impl std::io::Write for SpinnerWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf);
        let msg = msg.trim_end();

        match slot().as_ref() {
            Some(pb) => pb.suspend(|| eprintln!("{msg}")),
            None => eprintln!("{msg}"),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
