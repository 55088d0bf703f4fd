//! Grants Forms CLI
//!
//! Command-line interface for the grants form engine.
//!
//! # Usage
//!
//! ```bash
//! grants render --schema sf424a.json --ui sf424a.ui.json --data response.json
//! grants render --schema sf424a.json --ui sf424a.ui.json --data response.json --print
//! grants submit --form-id sf424a --application-id 1234 --data pairs.json
//! grants split --at 600 summary.html
//! grants config set api_url https://api.simpler.grants.gov
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "grants")]
#[command(version)]
#[command(about = "Grants Forms Command Line Interface", long_about = None)]
struct Cli {
    /// API endpoint URL
    #[arg(long, env = "GRANTS_API_URL")]
    api_url: Option<String>,

    /// API token for authentication
    #[arg(long, env = "GRANTS_API_TOKEN")]
    token: Option<String>,

    /// Output format [default: profile `default_format`, else pretty]
    #[arg(long, short)]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short)]
    profile: Option<String>,

    /// Engine configuration (JSON)
    #[arg(long, env = "GRANTS_ENGINE_CONFIG")]
    engine_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a form schema pair into a widget tree
    Render {
        /// JSON Schema file
        #[arg(long)]
        schema: PathBuf,
        /// UI schema file
        #[arg(long)]
        ui: Option<PathBuf>,
        /// Form value to render and validate
        #[arg(long)]
        data: Option<PathBuf>,
        /// Render the read-only print view
        #[arg(long)]
        print: bool,
    },
    /// Submit flat form data through the form action pipeline
    Submit {
        #[arg(long)]
        form_id: String,
        #[arg(long)]
        application_id: String,
        /// JSON object of submitted `name: value` pairs
        #[arg(long)]
        data: PathBuf,
    },
    /// Split markup without breaking tags
    Split {
        /// Split position in characters
        #[arg(long)]
        at: Option<usize>,
        file: PathBuf,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set configuration value
    Set { key: String, value: String },
    /// Get configuration value
    Get { key: String },
    /// List all configuration
    List,
    /// Initialize configuration
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let profile = config::Config::load(cli.profile.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable profile");
        config::Config::default()
    });
    let api_url = cli
        .api_url
        .or(profile.api_url)
        .unwrap_or_else(|| config::DEFAULT_API_URL.to_string());
    let token = cli.token.or(profile.token);
    let format = cli
        .format
        .or_else(|| {
            profile
                .default_format
                .as_deref()
                .and_then(|f| <output::OutputFormat as clap::ValueEnum>::from_str(f, true).ok())
        })
        .unwrap_or(output::OutputFormat::Pretty);

    let result = match commands::engine_config(cli.engine_config.as_deref()) {
        Ok(engine) => match cli.command {
            Commands::Render {
                schema,
                ui,
                data,
                print,
            } => commands::render::handle(&schema, ui.as_deref(), data.as_deref(), print, &engine, format),
            Commands::Submit {
                form_id,
                application_id,
                data,
            } => {
                let client = commands::ApiClient::new(&api_url, token.as_deref());
                commands::submit::handle(&form_id, &application_id, &data, client, engine, format).await
            }
            Commands::Split { at, file } => {
                commands::split::handle(&file, at.unwrap_or(engine.summary_split_at), format)
            }
            Commands::Config { action } => commands::config::handle(action, cli.profile.as_deref()),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
