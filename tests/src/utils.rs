use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use linkr_common::config::Config;
use linkr_common::network::gateway::StaticGateway;
use linkr_common::store::FileEndpointStore;
use linkr_core::establish::Connector;
use linkr_core::network::tcp::TcpLink;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Loopback anchor; every 127.0.0.x answers locally on Linux.
pub const GATEWAY: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

/// A one-message-per-connection receiver bound to a single loopback address.
pub struct Receiver {
    pub addr: SocketAddr,
    messages: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl Receiver {
    /// Binds `127.0.0.<host>:<port>`; port 0 picks a free one.
    pub async fn start(host: u8, port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::new(127, 0, 0, host), port)).await?;
        let addr: SocketAddr = listener.local_addr()?;
        let (tx, messages) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = String::new();
                    if stream.read_to_string(&mut buf).await.is_ok() && !buf.is_empty() {
                        let _ = tx.send(buf);
                    }
                });
            }
        });

        Ok(Self {
            addr,
            messages,
            task,
        })
    }

    pub fn ip(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn next_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.messages.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stops accepting and releases the socket before returning.
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

pub fn config(port: u16) -> Config {
    Config {
        port,
        probe_timeout_ms: 500,
        scan_timeout_ms: 5_000,
        establish_timeout_ms: 20_000,
        max_retries: 1,
        retry_delay_ms: 100,
        gateway: Some(GATEWAY),
        ..Config::default()
    }
}

pub fn connector(cfg: Config, store_path: &Path) -> Connector {
    let store = FileEndpointStore::new(store_path, cfg.port);
    Connector::new(
        cfg,
        Arc::new(TcpLink),
        Arc::new(store),
        Arc::new(StaticGateway(GATEWAY)),
    )
}
