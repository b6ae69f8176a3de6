//! Command-line surface for valor-collab.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::collab::{
    BrokerLimits, ChannelBroker, FsSnapshotStore, MemorySnapshotStore, PresenceTracker,
    RoomManager, SnapshotStore, TimeoutStore,
};
use crate::config::{Config, StoreBackend};
use crate::core::RoomKey;
use crate::protocol::SnapshotResponse;
use crate::{Error, Result};

mod serve;

pub use serve::serve_stdio;

#[derive(Parser, Debug)]
#[command(
    name = "valor-collab",
    version,
    about = "Real-time document collaboration engine",
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file layered over the user config.
    #[arg(long, global = true, value_name = "PATH", env = "VALOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve newline-delimited envelopes on stdin/stdout.
    #[command(alias = "serve")]
    ServeStdio,

    /// Print the client view of a stored document.
    Snapshot(SnapshotArgs),

    /// Print the effective config as TOML.
    Config,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long = "doc", alias = "doc-id")]
    pub doc: String,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

/// Run the CLI (used by bin).
pub fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::ServeStdio => serve_stdio(&config),
        Commands::Snapshot(args) => print_snapshot(&config, &args),
        Commands::Config => {
            print!("{}", crate::config::render(&config)?);
            Ok(())
        }
    }
}

/// Snapshot store selected by config, with the configured call timeout.
pub fn open_store(config: &Config) -> Result<Arc<dyn SnapshotStore>> {
    let timeout = Duration::from_millis(config.collab.store_timeout_ms);
    let store: Arc<dyn SnapshotStore> = match config.store.backend {
        StoreBackend::Fs => {
            let dir = config.store.resolved_dir();
            tracing::debug!(dir = %dir.display(), "opening filesystem snapshot store");
            Arc::new(TimeoutStore::new(FsSnapshotStore::open(dir)?, timeout))
        }
        StoreBackend::Memory => {
            tracing::warn!("memory snapshot store: documents are lost on exit");
            Arc::new(TimeoutStore::new(MemorySnapshotStore::new(), timeout))
        }
    };
    Ok(store)
}

fn print_snapshot(config: &Config, args: &SnapshotArgs) -> Result<()> {
    let key = RoomKey::parse(&args.tenant, &args.doc)?;
    let limits = config.limits.clone();
    let broker = ChannelBroker::new(BrokerLimits::from_limits(&limits));
    let manager = RoomManager::new(
        config.collab.clone(),
        limits,
        open_store(config)?,
        Arc::new(broker),
        Arc::new(PresenceTracker::new(Duration::from_millis(
            config.collab.presence_ttl_ms,
        ))),
    );
    let view = manager.current_snapshot(&key)?;
    let body = serde_json::to_string_pretty(&SnapshotResponse::from(view))
        .map_err(|e| Error::Collab(e.into()))?;
    println!("{body}");
    Ok(())
}
