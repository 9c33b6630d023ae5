#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload};

use screen_sync::app::{self, controller, renderer};
use screen_sync::config::AppConfig;
use screen_sync::error::LogErrorReporter;
use screen_sync::screen::ScreenId;
use screen_sync::settings::JsonFileSettingStore;

#[derive(Parser, Debug)]
#[command(name = "screen-sync", version, about = "Synchronized presentation screens")]
struct Cli {
    /// Bus socket path
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Setting store directory
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Own the screens and read operator commands from stdin
    Controller,
    /// Mirror one screen from a running controller
    Renderer {
        #[arg(long)]
        screen_id: ScreenId,
    },
    /// Print the persisted screens and exit
    List,
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn env_level() -> Option<LevelFilter> {
    std::env::var("LOG_LEVEL").ok().map(|level| parse_level(&level))
}

/// SIGINT/SIGTERM set the returned flag
fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&flag))
                .context("Failed to register signal handler")?;
        }
    }
    Ok(flag)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Installed before the config loads so its warnings are not lost
    let (level, level_handle) = reload::Layer::new(env_level().unwrap_or(LevelFilter::INFO));
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(level).with(fmt::layer()),
    )?;

    let config = AppConfig::load();
    if env_level().is_none() {
        level_handle
            .reload(parse_level(&config.log_level))
            .context("Failed to apply configured log level")?;
    }

    let settings_dir = config.resolve_settings_dir(cli.settings_dir.as_deref());

    match cli.command {
        Mode::Controller => {
            let socket_path = config.resolve_socket_path(cli.socket.as_deref())?;
            info!(settings = %settings_dir.display(), "Starting controller");
            controller::run(&config, &socket_path, &settings_dir, shutdown_flag()?)
        }
        Mode::Renderer { screen_id } => {
            let socket_path = config.resolve_socket_path(cli.socket.as_deref())?;
            info!(screen_id, "Starting renderer");
            renderer::run(&config, screen_id, &socket_path, &settings_dir, shutdown_flag()?)
        }
        Mode::List => {
            let store = JsonFileSettingStore::open(&settings_dir)?;
            let lines = app::list_persisted(&store, &LogErrorReporter);
            if lines.is_empty() {
                println!("no screens persisted in {}", settings_dir.display());
            }
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }
    }
}
