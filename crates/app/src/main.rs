mod cli;
mod commands;
mod web;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use providers::{Backend, GeminiClient};
use services::history::DEFAULT_FLUSH_GRACE;
use services::{HistoryStore, HistoryWriter, HostContext, Platform};
use shared::settings::Settings;
use std::sync::Arc;

/// Everything a subcommand needs, built once per process.
pub struct AppContext {
    pub settings: Settings,
    pub backend: Arc<dyn Backend>,
    pub platform: Arc<dyn Platform>,
    history: Option<Arc<HistoryWriter>>,
}

impl AppContext {
    fn new(settings: Settings) -> Result<Self> {
        let history = match HistoryStore::open(&settings.history_path) {
            Ok(store) => Some(Arc::new(HistoryWriter::spawn(store))),
            Err(e) => {
                tracing::warn!("History disabled: {:#}", e);
                None
            }
        };

        let mut client = GeminiClient::new(&settings)?.with_context(Arc::new(HostContext::new()));
        if let Some(writer) = &history {
            client = client.with_history(writer.clone());
        }

        let platform: Arc<dyn Platform> = Arc::from(services::platform::detect());
        tracing::debug!("Platform: {}", platform.name());

        Ok(Self {
            settings,
            backend: Arc::new(client),
            platform,
            history,
        })
    }

    /// Give queued history writes a bounded amount of time to land.
    fn shutdown(&self) {
        if let Some(writer) = &self.history {
            writer.shutdown(DEFAULT_FLUSH_GRACE);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let Some(command) = cli.into_command() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let settings = Settings::from_env()?;
    let ctx = AppContext::new(settings)?;

    let result = match command {
        Commands::Ask { words } => commands::ask(&ctx, &words).await,
        Commands::Writer { text } => {
            let mut out = std::io::stdout();
            commands::writer(ctx.backend.as_ref(), &text.join(" "), &mut out)
                .await
                .map(|_| ())
        }
        Commands::Commit { path, prompt } => {
            commands::commit_here(&ctx, path, prompt.as_deref()).await
        }
        Commands::Assist { words } => commands::assist(&ctx, &words).await,
        Commands::Web { no_open } => commands::web(&ctx, no_open).await,
    };

    ctx.shutdown();
    result
}
