//! Hearth operator CLI
//!
//! Runs migrations and housekeeping against the Hearth SQLite database and
//! serves a liveness endpoint.

mod args;
mod cli;
mod renderer;
mod server;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use args::{Args, Commands};
use clap::Parser;
use cli::Cli;
use hearth_core::{StoreBuilder, StoreConfig};
use log::info;
use renderer::TerminalRenderer;
use Commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal; real environment variables still win.
    dotenvy::dotenv().ok();
    env_logger::init();

    let Args {
        database_file,
        migrations_dir,
        read_only,
        no_color,
        command,
    } = Args::parse();

    let mut config = StoreConfig::from_env().context("Invalid database configuration")?;
    if let Some(path) = database_file {
        config.database_path = path;
    }
    if let Some(dir) = migrations_dir {
        config.migrations_dir = dir;
    }
    config.read_only |= read_only;

    let cli = || Cli::new(config.clone(), TerminalRenderer::new(!no_color));

    match command {
        Migrate => cli().migrate().await,
        Status { json } => cli().status(json).await,
        Health => cli().health().await,
        Checkpoint { mode } => cli().checkpoint(mode.into()).await,
        Vacuum => cli().vacuum().await,
        Serve {
            host,
            port,
            no_signal_handlers,
        } => {
            let store = StoreBuilder::from_config(config.clone())
                .build()
                .await
                .context("Failed to initialize database")?;
            info!("Starting Hearth health server");
            server::serve(store, SocketAddr::new(host, port), !no_signal_handlers).await
        }
    }
}
