//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

use seoforge_core::anthropic::{AnthropicGenerator, AnthropicOptions};
use seoforge_core::pipeline::PipelineDeps;
use seoforge_core::workspace::WorkspaceRoot;
use seoforge_ledger::Ledger;
use seoforge_markdown::PandocConverter;
use seoforge_shared::{AppConfig, init_config, load_config, load_config_from};
use seoforge_spyfu::{SpyfuClient, SpyfuOptions};

use crate::routes;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SEO Forge: ranking analysis and SEO content generation.
#[derive(Parser)]
#[command(
    name = "seoforge",
    version,
    about = "Keyword ranking analysis and SEO content generation over HTTP.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP server.
    Serve {
        /// Config file (defaults to ~/.seoforge/seoforge.toml).
        #[arg(long, env = "SEOFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Override the bind address from the config.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seoforge=info,tower_http=info",
        1 => "seoforge=debug,tower_http=debug",
        _ => "seoforge=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { config, bind } => cmd_serve(config, bind).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

async fn cmd_serve(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let config: AppConfig = match &config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    // Credentials are checked here so a misconfigured server never starts.
    let rankings = SpyfuClient::new(SpyfuOptions::from_config(&config.spyfu)?)?;
    let generator = AnthropicGenerator::new(AnthropicOptions::from_config(&config.anthropic)?)?;
    let converter = PandocConverter::new(config.converter.command.clone());

    let ledger_path = config.workspace.ledger_path();
    let ledger = Arc::new(
        Ledger::open(&ledger_path)
            .await
            .wrap_err_with(|| format!("failed to open ledger at {}", ledger_path.display()))?,
    );

    let deps = PipelineDeps {
        generator: Arc::new(generator),
        rankings: Arc::new(rankings),
        converter: Arc::new(converter),
        observer: ledger.clone(),
    };

    let state = AppState::new(
        WorkspaceRoot::new(&config.workspace.root),
        ledger,
        deps,
        config.blog.search_augmented,
    );
    let app = routes::router(Arc::new(state), &config.server.allowed_origins);

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        workspace_root = %config.workspace.root,
        ledger = %ledger_path.display(),
        search_augmented = config.blog.search_augmented,
        "seoforge server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
