use linkr_core::establish::Connector;
use tracing::info;

use crate::terminal::print;

pub fn reset(connector: &Connector, quiet: bool) -> anyhow::Result<()> {
    print::header("resetting connection", quiet);
    connector.reset()?;
    info!("Saved receiver forgotten, the next connect will search the network");
    Ok(())
}
