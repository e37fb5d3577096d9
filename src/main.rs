use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::net::TcpListener;
use tracing::info;

use rag_router::models::Event;
use rag_router::storage::ConfigStore;
use rag_router::types::{Blob, Content, Part};
use rag_router::{build_state, config::Config, create_router, utils::init_logger};

#[derive(Parser)]
#[command(
    name = "rag-router",
    version,
    about = "Routes turns between a file-indexing agent and a grounded search agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Run a single turn in a fresh session and print its events
    Ask {
        message: String,

        /// Attach a file; the MIME type is guessed from the path
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
    },

    /// Print the persisted file store configuration
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Ask { message, files } => ask(config, message, files).await,
        Commands::Status => status(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Configuration loaded: {:?}", config.server);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid HOST {}", config.server.host))?;
    let addr = SocketAddr::from((host, config.server.port));

    let state = build_state(config);
    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn ask(config: Config, message: String, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut parts = Vec::new();
    if !message.trim().is_empty() {
        parts.push(Part::text(message));
    }
    for path in &files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mime_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
        info!(path = %path.display(), %mime_type, bytes = data.len(), "Attaching file");
        parts.push(Part::inline(Blob::new(mime_type, data)));
    }
    if parts.is_empty() {
        anyhow::bail!("nothing to send: give a message or at least one --file");
    }

    let state = build_state(config);
    let session = state.sessions.create_session().await;
    let turn = state.runner.run_turn(session.id, Content::user(parts)).await?;

    println!("session {} -> {}", session.id, turn.destination);
    let mut events = turn.events;
    while let Some(event) = events.next().await {
        print_event(&event);
    }

    Ok(())
}

fn print_event(event: &Event) {
    if let Some(error) = &event.error_message {
        println!("[{}] error: {}", event.author, error);
        return;
    }
    let Some(content) = &event.content else { return };
    for part in &content.parts {
        if let Some(text) = &part.text {
            println!("[{}] {}", event.author, text);
        }
        if let Some(call) = &part.function_call {
            println!("[{}] -> {}({})", event.author, call.name, call.args);
        }
        if let Some(response) = &part.function_response {
            println!("[{}] <- {}: {}", event.author, response.name, response.response);
        }
    }
}

async fn status(config: Config) -> anyhow::Result<()> {
    let store = rag_router::storage::JsonConfigStore::new(config.store.config_path.clone());
    match store.load().await? {
        Some(saved) => println!("{}", serde_json::to_string_pretty(&saved)?),
        None => println!("No file store configured at {}", store.path().display()),
    }
    Ok(())
}
