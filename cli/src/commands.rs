pub mod connect;
pub mod listen;
pub mod reset;
pub mod scan;
pub mod send;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use linkr_common::config::Config;
use linkr_common::network::gateway::{GatewaySource, StaticGateway, SystemGateway};
use linkr_common::store::{EndpointStore, FileEndpointStore, MemoryEndpointStore};
use linkr_core::establish::Connector;
use linkr_core::network::tcp::TcpLink;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "linkr")]
#[command(about = "Find a receiver on the local network and send it text.")]
#[command(version)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Read configuration from this TOML file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Receiver port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Skip discovery and use this receiver address
    #[arg(short, long, global = true, value_name = "IP")]
    pub manual: Option<String>,

    /// Anchor the subnet sweep on this address instead of the detected gateway
    #[arg(short, long, global = true, value_name = "IP")]
    pub gateway: Option<Ipv4Addr>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only print results and warnings
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Locate a receiver and remember it
    #[command(alias = "c")]
    Connect,
    /// Send one message to the receiver
    #[command(alias = "s")]
    Send { text: String },
    /// Sweep the local subnet and list every receiver that answers
    Scan,
    /// Forget the saved receiver
    Reset,
    /// Print every message received on this machine, up to 64 KiB each
    #[command(alias = "l")]
    Listen {
        /// Address to accept connections on; defaults to all interfaces
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// File configuration with command line overrides applied on top.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut cfg: Config = Config::load(self.config.as_deref()).context("loading configuration")?;

        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(address) = &self.manual {
            cfg.manual_override_enabled = true;
            cfg.manual_address = Some(address.clone());
        }
        if let Some(gateway) = self.gateway {
            cfg.gateway = Some(gateway);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

pub fn build_connector(cfg: Config) -> Connector {
    let store: Arc<dyn EndpointStore> = match FileEndpointStore::in_data_dir(cfg.port) {
        Ok(store) => {
            debug!(path = %store.path().display(), "using endpoint store");
            Arc::new(store)
        }
        Err(e) => {
            warn!("Saved receiver unavailable, nothing will be remembered: {e}");
            Arc::new(MemoryEndpointStore::new())
        }
    };

    let gateway: Arc<dyn GatewaySource> = gateway_source(&cfg);
    Connector::new(cfg, Arc::new(TcpLink), store, gateway)
}

/// The configured gateway override, else the platform's own.
pub fn gateway_source(cfg: &Config) -> Arc<dyn GatewaySource> {
    match cfg.gateway {
        Some(ip) => Arc::new(StaticGateway(ip)),
        None => Arc::new(SystemGateway),
    }
}
