//! # RAG Chat CLI (`ragchat`)
//!
//! Runs the chat server, or exercises its pieces from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat serve` | Start the HTTP server and chat UI |
//! | `ragchat models` | List backend models and the default choice |
//! | `ragchat search "<query>"` | Run the web scrapers and print the result block |
//! | `ragchat extract <file>` | Print the text extracted from a local document |
//! | `ragchat ask "<message>"` | Run one chat turn against the backend |
//!
//! Logging goes to stderr and is filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use rag_chat::config::{self, Config};
use rag_chat::extract::extract_text;
use rag_chat::prompt::search_block;
use rag_chat::search::WebSearch;
use rag_chat::server;
use rag_chat::service::ChatService;

/// Local chat with an Ollama model, uploaded documents, and web search.
#[derive(Parser)]
#[command(name = "ragchat", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragchat.toml`; when it does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the chat page plus its JSON API.
    Serve,

    /// List models advertised by the backend and the one that would be used.
    Models,

    /// Search the web with both scrapers and print what a prompt would contain.
    Search {
        /// The search query string.
        query: String,
    },

    /// Print the text extracted from a local file.
    Extract {
        /// Path to a .txt, .md, .html, .pdf or .docx file.
        path: PathBuf,
    },

    /// Send a single message to the model.
    Ask {
        /// The question to ask.
        message: String,

        /// Include web search results in the prompt.
        #[arg(long)]
        search: bool,

        /// Model to use instead of the default choice.
        #[arg(long)]
        model: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Extraction is purely local, so configuration is only loaded by the
    // commands that use it.
    let load = || config::load_or_default(&cli.config);

    match cli.command {
        Commands::Extract { path } => {
            run_extract(&path)?;
        }
        Commands::Serve => {
            server::run_server(&load()?).await?;
        }
        Commands::Models => {
            run_models(load()?).await?;
        }
        Commands::Search { query } => {
            run_search(&load()?, &query).await?;
        }
        Commands::Ask {
            message,
            search,
            model,
        } => {
            run_ask(load()?, &message, search, model.as_deref()).await?;
        }
    }

    Ok(())
}

fn run_extract(path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!("{}", extract_text(&bytes, &name));
    Ok(())
}

async fn run_models(cfg: Config) -> anyhow::Result<()> {
    let service = ChatService::new(cfg)?;
    let list = service.list_models().await;
    if let Some(err) = &list.error {
        eprintln!("Warning: could not reach backend: {}", err);
    }
    for model in &list.models {
        let marker = if model.name == list.current_model { "*" } else { " " };
        println!("{} {} ({})", marker, model.name, model.tag);
    }
    Ok(())
}

async fn run_search(cfg: &Config, query: &str) -> anyhow::Result<()> {
    let search = WebSearch::from_config(&cfg.search)?;
    let outcome = search.gather(query).await;
    print!("{}", search_block(&outcome));
    Ok(())
}

async fn run_ask(
    cfg: Config,
    message: &str,
    include_search: bool,
    model: Option<&str>,
) -> anyhow::Result<()> {
    let service = ChatService::new(cfg)?;
    let reply = service.chat(message, include_search, model).await?;
    if let Some(context) = reply.search_context.as_deref() {
        eprintln!("{}", context.trim_end());
    }
    println!("{}", reply.response);
    Ok(())
}
