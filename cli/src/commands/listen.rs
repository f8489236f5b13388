//! Reference receiver: every accepted connection carries exactly one message,
//! terminated by the sender closing its side.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use colored::*;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::terminal::{colors, print};

/// Largest message accepted from one connection; anything past it is dropped.
const MAX_MESSAGE: usize = 64 * 1024;

struct Message {
    text: String,
    truncated: bool,
}

pub async fn listen(bind: Option<SocketAddr>, port: u16, quiet: bool) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.unwrap_or(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    print::header("listening", quiet);
    info!("Waiting for messages on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accepting connection")?;
                tokio::spawn(async move {
                    match read_message(stream).await {
                        Ok(message) => {
                            if message.truncated {
                                warn!("{peer}: message longer than {MAX_MESSAGE} bytes, showing the start only");
                            }
                            show(peer, &message.text);
                        }
                        Err(e) => warn!("{peer}: {e:#}"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                return Ok(());
            }
        }
    }
}

async fn read_message(stream: impl AsyncRead + Unpin) -> anyhow::Result<Message> {
    let mut buf: Vec<u8> = Vec::new();
    // one byte past the limit tells a full-size message from a cut one
    stream
        .take(MAX_MESSAGE as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .context("reading message")?;

    let truncated: bool = buf.len() > MAX_MESSAGE;
    buf.truncate(MAX_MESSAGE);
    Ok(Message {
        text: String::from_utf8_lossy(&buf).into_owned(),
        truncated,
    })
}

fn show(peer: SocketAddr, text: &str) {
    if text.is_empty() {
        // a bare probe: connect, then close
        debug!(%peer, "probe");
        return;
    }
    let from: ColoredString = peer.ip().to_string().color(colors::IPV4_ADDR);
    print::print(&format!("{} {} {}", from, ">".color(colors::SEPARATOR), text));
}
