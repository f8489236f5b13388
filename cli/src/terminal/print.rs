use std::fmt::Display;

use crate::terminal::colors;
use colored::*;
use tracing::info;

pub const TOTAL_WIDTH: usize = 64;
pub const PRINT_TARGET: &str = "linkr::print";
const FIELD_WIDTH: usize = 11;
const BRANCH_WIDTH: usize = 9;

/// Emits one user-facing line through the logging pipeline, unprefixed.
pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, raw_msg = msg);
}

pub fn blank() {
    print("");
}

pub fn banner(quiet: bool) {
    if quiet {
        return;
    }
    let title: String = format!("⟦ LINKR v{} ⟧", env!("CARGO_PKG_VERSION"));
    print(&ruled(&title.bright_green().bold().to_string(), '═'));
}

pub fn header(msg: &str, quiet: bool) {
    if quiet {
        return;
    }
    let title: String = format!("⟦ {} ⟧", msg.to_uppercase());
    print(&ruled(&title.bright_green().to_string(), '─'));
}

pub fn fat_separator() {
    print(&"═".repeat(TOTAL_WIDTH).bright_black().to_string());
}

/// `> Key......: value`
pub fn field(key: &str, value: impl Display) {
    status(format!("{} {}", dotted(key, FIELD_WIDTH, colors::PRIMARY), value));
}

pub fn status(msg: impl AsRef<str>) {
    let prefix: ColoredString = ">".color(colors::SEPARATOR);
    print(&format!("{} {}", prefix, msg.as_ref().color(colors::TEXT_DEFAULT)));
}

/// `[idx] label`, the head of a [`branches`] block.
pub fn node(idx: usize, label: &str) {
    let idx: ColoredString = idx.to_string().color(colors::ACCENT);
    print(&format!(
        "{}{}{} {}",
        "[".color(colors::SEPARATOR),
        idx,
        "]".color(colors::SEPARATOR),
        label.color(colors::PRIMARY)
    ));
}

pub fn branches(rows: &[(String, ColoredString)]) {
    for (i, (key, value)) in rows.iter().enumerate() {
        let branch: &str = if i + 1 == rows.len() { "└─" } else { "├─" };
        print(&format!(
            " {} {} {}",
            branch.bright_black(),
            dotted(key, BRANCH_WIDTH, colors::TEXT_DEFAULT),
            value
        ));
    }
}

pub fn centered(msg: &str) {
    let pad: usize = TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2;
    print(&format!("{}{}", " ".repeat(pad), msg));
}

const NO_PEER: &str = r#"
         _   _  ___    ____  _____ _____ ____
        | \ | |/ _ \  |  _ \| ____| ____|  _ \
        |  \| | | | | | |_) |  _| |  _| | |_) |
        | |\  | |_| | |  __/| |___| |___|  _ <
        |_| \_|\___/  |_|   |_____|_____|_| \_\
"#;

pub fn no_results() {
    print(&NO_PEER.red().bold().to_string());
}

pub fn recovery_hints() {
    status("Make sure the receiver is running, then retry with `linkr connect`");
    status("Point at a known address with `--manual <IP>`");
    status("Forget the saved address with `linkr reset`");
}

/// `key` padded with dots to `width`, then a colon.
fn dotted(key: &str, width: usize, key_color: Color) -> String {
    let dots: String = ".".repeat(width.saturating_sub(key.chars().count()));
    format!(
        "{}{}{}",
        key.color(key_color),
        dots.color(colors::SEPARATOR),
        ":".color(colors::SEPARATOR)
    )
}

/// `title` centred on a rule of `fill` spanning [`TOTAL_WIDTH`] columns.
fn ruled(title: &str, fill: char) -> String {
    let free: usize = TOTAL_WIDTH.saturating_sub(console::measure_text_width(title));
    let left: usize = free / 2;
    let right: usize = free - left;
    format!(
        "{}{}{}",
        fill.to_string().repeat(left).bright_black(),
        title,
        fill.to_string().repeat(right).bright_black()
    )
}
