use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::StatusQuery;
use newsletter::config::LoggingConfig;

#[derive(Parser)]
#[command(
    name = "newsletter",
    version,
    about = "Scheduled newsletter dispatch: polls due content and fans it out to topic subscribers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults to NEWSLETTER_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the [logging] section
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poll trigger and metrics server until Ctrl+C
    Run,

    /// Run a single poll and exit
    Poll,

    /// Manage topics
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Subscribe one or more addresses to a topic
    Subscribe {
        /// Topic id
        #[arg(short, long)]
        topic: i64,

        /// Email addresses
        #[arg(required = true)]
        emails: Vec<String>,
    },

    /// Schedule content
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },

    /// Show content status: all, pending, sent, or a content id
    Status {
        #[arg(default_value = "all")]
        query: StatusQuery,
    },
}

#[derive(Subcommand)]
enum TopicAction {
    /// Create a topic
    Add {
        /// Topic name
        name: String,
    },

    /// List topics with subscriber counts
    List,
}

#[derive(Subcommand)]
enum ContentAction {
    /// Schedule one content item
    Add {
        /// Topic id
        #[arg(short, long)]
        topic: i64,

        /// Send time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Content text
        text: String,
    },

    /// Schedule content items from a JSON file
    Import {
        /// JSON array of {text, scheduled_time, topic_id}
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    setup_tracing(&config.logging, cli.verbose)?;
    let config = &config;

    match cli.command {
        Commands::Run => {
            tracing::info!(config = ?cli.config, "Starting scheduler");
            commands::run(config).await?;
        }

        Commands::Poll => {
            tracing::info!(config = ?cli.config, "Starting single poll");
            commands::poll(config).await?;
        }

        Commands::Topic { action } => match action {
            TopicAction::Add { name } => commands::topic_add(config, name).await?,
            TopicAction::List => commands::topic_list(config).await?,
        },

        Commands::Subscribe { topic, emails } => {
            commands::subscribe(config, topic, emails).await?;
        }

        Commands::Content { action } => match action {
            ContentAction::Add { topic, at, text } => {
                commands::content_add(config, topic, text, at).await?;
            }
            ContentAction::Import { input } => {
                commands::content_import(config, input).await?;
            }
        },

        Commands::Status { query } => {
            commands::status(config, query).await?;
        }
    }

    Ok(())
}

fn setup_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let directive = logging.filter_directive(verbose);
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new(directive)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive))
    };

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}
