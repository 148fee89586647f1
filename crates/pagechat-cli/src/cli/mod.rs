//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pagechat_core::config;
use tracing_subscriber::EnvFilter;

use crate::interrupt;

mod commands;
mod input;

#[derive(Parser)]
#[command(name = "pagechat")]
#[command(version)]
#[command(about = "Ask questions about a web page")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Extract the readable text of a serialized page
    Extract {
        /// Page JSON file (`-` for stdin)
        #[arg(value_name = "PAGE_JSON")]
        page: PathBuf,
    },

    /// Render markdown to HTML
    Render {
        /// Markdown file (stdin when omitted)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Use the regex pipeline instead of the span renderer
        #[arg(long)]
        legacy: bool,
    },

    /// Ask a question about a page
    Ask {
        /// Page JSON file (`-` for stdin)
        #[arg(long, value_name = "PAGE_JSON")]
        page: PathBuf,

        /// Override the model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Print the rendered HTML once the answer is complete
        #[arg(long)]
        html: bool,

        /// Do not append the exchange to the page history
        #[arg(long = "no-save")]
        no_save: bool,

        /// The question to ask
        #[arg(value_name = "QUESTION")]
        question: String,
    },

    /// Inspect stored conversations
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Show or change the chat text size
    Zoom {
        #[command(subcommand)]
        command: Option<ZoomCommands>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum HistoryCommands {
    /// Prints the stored messages for a page
    Show {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Deletes the stored messages for a page
    Clear {
        #[arg(value_name = "URL")]
        url: String,
    },
}

#[derive(clap::Subcommand)]
enum ZoomCommands {
    /// Print the current level
    Show,
    /// Step one level larger
    In,
    /// Step one level smaller
    Out,
    /// Set a level (small, normal, large, extra-large)
    Set {
        #[arg(value_name = "LEVEL")]
        level: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract { page } => {
            let config = config::Config::load().context("load config")?;
            commands::extract::run(&page, &config)
        }
        Commands::Render { file, legacy } => {
            let config = config::Config::load().context("load config")?;
            commands::render::run(file.as_deref(), legacy, &config)
        }
        Commands::Ask {
            page,
            model,
            html,
            no_save,
            question,
        } => {
            let config = config::Config::load().context("load config")?;
            let cancel = interrupt::init()?;
            commands::ask::run(commands::ask::AskOptions {
                page: &page,
                question: &question,
                config: &config,
                model_override: model.as_deref(),
                html,
                no_save,
                cancel,
            })
            .await
        }
        Commands::History { command } => match command {
            HistoryCommands::Show { url } => commands::history::show(&url),
            HistoryCommands::Clear { url } => commands::history::clear(&url),
        },
        Commands::Zoom { command } => match command.unwrap_or(ZoomCommands::Show) {
            ZoomCommands::Show => commands::zoom::show(),
            ZoomCommands::In => commands::zoom::step(true),
            ZoomCommands::Out => commands::zoom::step(false),
            ZoomCommands::Set { level } => commands::zoom::set(&level),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
