//! filetrigger CLI
//!
//! Create blob containers, move blobs in and out of Azure Storage, and
//! publish to or read from Azure Event Hubs.

mod commands;
mod config;
mod shutdown;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use filetrigger_azure::{Components, FileTrigger, TriggerConfig};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{FileConfig, Overrides};

/// Config file read when `--config` is not given, if it exists.
const DEFAULT_CONFIG_PATH: &str = "filetrigger.toml";

/// filetrigger: Azure Blob Storage and Event Hubs from the command line.
#[derive(Parser, Debug)]
#[command(name = "filetrigger", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "FILETRIGGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Storage account name.
    #[arg(long, env = "FILETRIGGER_ACCOUNT_NAME", global = true)]
    account_name: Option<String>,

    /// Blob endpoint override (e.g. an Azurite URL).
    #[arg(long, env = "FILETRIGGER_BLOB_ENDPOINT", global = true)]
    blob_endpoint: Option<String>,

    /// Event Hubs fully-qualified namespace.
    #[arg(long, env = "FILETRIGGER_NAMESPACE", global = true)]
    namespace: Option<String>,

    /// Event Hub name.
    #[arg(long, env = "FILETRIGGER_EVENT_HUB", global = true)]
    event_hub: Option<String>,

    /// Consumer group for receiving.
    #[arg(long, env = "FILETRIGGER_CONSUMER_GROUP", global = true)]
    consumer_group: Option<String>,

    /// Event Hubs connection string (namespace and EntityPath are used).
    #[arg(
        long,
        env = "FILETRIGGER_CONNECTION_STRING",
        hide_env_values = true,
        global = true
    )]
    connection_string: Option<String>,

    /// Event Hubs endpoint override.
    #[arg(long, env = "FILETRIGGER_EVENTHUBS_ENDPOINT", global = true)]
    eventhubs_endpoint: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the configured services are reachable.
    Health,
    /// Manage blob containers.
    Container(commands::container::ContainerArgs),
    /// Upload, download and delete blobs.
    Blob(commands::blob::BlobArgs),
    /// Send and receive Event Hubs events.
    Events(commands::events::EventsArgs),
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            account_name: self.account_name.clone(),
            blob_endpoint: self.blob_endpoint.clone(),
            namespace: self.namespace.clone(),
            event_hub: self.event_hub.clone(),
            consumer_group: self.consumer_group.clone(),
            connection_string: self.connection_string.clone(),
            eventhubs_endpoint: self.eventhubs_endpoint.clone(),
        }
    }
}

impl Command {
    /// The clients this command needs.
    fn components(&self, config: &TriggerConfig) -> Components {
        use commands::events::EventsCommand;

        match self {
            Self::Health => Components {
                blob: config.blob.endpoint().is_ok(),
                producer: config.eventhubs.resolve().is_ok(),
                consumer: false,
            },
            Self::Container(_) | Self::Blob(_) => Components::BLOB,
            Self::Events(args) => match args.command {
                EventsCommand::Send { .. } | EventsCommand::SendBatch { .. } => {
                    Components::PRODUCER
                }
                EventsCommand::Receive { .. } | EventsCommand::Partitions => Components::CONSUMER,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let file_config = match cli.config {
        Some(ref path) => FileConfig::load(path, true)?,
        None => FileConfig::load(Path::new(DEFAULT_CONFIG_PATH), false)?,
    };
    let config = file_config.into_trigger_config(cli.overrides());

    let components = cli.command.components(&config);
    if components == Components::default() {
        anyhow::bail!("nothing is configured: set a storage account or an event hub");
    }
    let trigger = FileTrigger::connect(&config, components).await?;

    match cli.command {
        Command::Health => commands::health::run(&trigger).await,
        Command::Container(ref args) => commands::container::run(&trigger, args, &cli.format).await,
        Command::Blob(ref args) => commands::blob::run(&trigger, args, &cli.format).await,
        Command::Events(ref args) => commands::events::run(&trigger, args, &cli.format).await,
    }
}
