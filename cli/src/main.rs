mod commands;
mod terminal;

use commands::{CommandLine, Commands, connect, listen, reset, scan, send};
use linkr_common::config::Config;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLine::parse_args();

    logging::init_logging(cli.verbose, cli.quiet)?;
    print::banner(cli.quiet);

    let cfg: Config = cli.load_config()?;
    let quiet: bool = cli.quiet;

    match cli.command {
        Commands::Connect => {
            let connector = commands::build_connector(cfg);
            connect::connect(&connector, quiet).await
        }
        Commands::Send { text } => {
            let connector = commands::build_connector(cfg);
            send::send(&connector, &text, quiet).await
        }
        Commands::Scan => scan::scan(&cfg, quiet).await,
        Commands::Reset => {
            let connector = commands::build_connector(cfg);
            reset::reset(&connector, quiet)
        }
        Commands::Listen { bind } => listen::listen(bind, cfg.port, quiet).await,
    }
}
