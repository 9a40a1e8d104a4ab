//! XVC Collector - Xray violations collection tool

use clap::Parser;
use tracing::{error, info};
use xvc_collector::collector::ViolationsCollector;
use xvc_collector::config::CollectorConfig;
use xvc_collector::cursor::{CursorState, STATE_KEY};
use xvc_collector::state::FileStateStore;
use xvc_common::logging::{init_logging, LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "xvc-collector")]
#[command(author, version, about = "Xray violations collector")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one collection pass
    Run,

    /// Print the persisted resume cursor
    ShowState,

    /// Drop the persisted resume cursor; the next run restarts from the
    /// configured epoch
    ResetState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("xvc-collector".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = match CollectorConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Configuration rejected");
            return Ok(());
        }
    };

    // a failed run logs and exits cleanly; the persisted cursor is only
    // ever written at safe points, so there is nothing to unwind here
    match cli.command {
        Command::Run => match ViolationsCollector::new(config) {
            Ok(collector) => {
                if let Err(err) = collector.run().await {
                    error!(error = %format!("{err:#}"), "Collection run failed");
                }
            }
            Err(err) => error!(error = %err, "Collector setup failed"),
        },
        Command::ShowState => {
            let store = FileStateStore::new(config.state.path);
            match store.get::<CursorState>(STATE_KEY) {
                Ok(Some(cursor)) => info!(
                    created_from = %cursor.created_from(),
                    offset = cursor.offset(),
                    "Persisted cursor"
                ),
                Ok(None) => info!("No cursor persisted yet"),
                Err(err) => error!(error = %err, "State read failed"),
            }
        }
        Command::ResetState => {
            let store = FileStateStore::new(config.state.path);
            match store.remove(STATE_KEY) {
                Ok(()) => info!("Cursor dropped"),
                Err(err) => error!(error = %err, "State reset failed"),
            }
        }
    }

    Ok(())
}
