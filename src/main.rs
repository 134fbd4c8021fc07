use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use aprshub::config::{Config, config_path};
use aprshub::history::MemoryHistory;
use aprshub::passcode::passcode;
use aprshub::supervisor::Supervisor;
use aprshub::{CODENAME, PRODUCT_NAME, VERSION};

#[derive(Parser)]
#[command(name = "aprshub", version, about = "APRS-IS tier-2 server")]
struct Cli {
    /// Config file path (default: $APRSHUB_CONFIG or ./aprshub.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default)
    Run,
    /// Parse and validate the config file, then exit
    CheckConfig,
    /// Print the APRS-IS passcode for a callsign
    Passcode { callsign: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = cli.config.unwrap_or_else(config_path);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(path).await,
        Command::CheckConfig => {
            let config = Config::load(&path)?;
            println!(
                "{:?}: ok ({} listeners, {} uplinks, server id {})",
                path,
                config.server.listeners.len(),
                config.server.uplinks.len(),
                config.server.id
            );
            Ok(())
        }
        Command::Passcode { callsign } => {
            println!("{}", passcode(&callsign));
            Ok(())
        }
    }
}

async fn run(path: PathBuf) -> Result<()> {
    let config =
        Config::load(&path).with_context(|| format!("Cannot load config from {:?}", path))?;

    let supervisor = Supervisor::new(config, path, Arc::new(MemoryHistory::new()));
    supervisor.clone().start().await?;
    let _watcher = supervisor.clone().watch_config();

    info!("{} {}/{} running, Ctrl-C to stop", PRODUCT_NAME, VERSION, CODENAME);
    wait_for_shutdown().await;

    supervisor.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
