//! CLI Entry Point for room-control
//!
//! Provides command-line interface for:
//! - Running the controller with a line console standing in for the touch panel
//! - One-shot room actions (startup, shutdown, single display power)
//! - Printing the last known display state or the effective configuration
//!
//! # Usage
//!
//! ```bash
//! room-control run
//! room-control --config config/room.toml power left on
//! ROOM_APPLICATION__LOG_LEVEL=debug room-control status
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use room_control::config::{RoomConfig, DEFAULT_CONFIG_PATH};
use room_control::console::{ConsoleCommand, HELP};
use room_control::{tracing_setup, Room};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Time given to displays to answer the follow-up queries of a one-shot action.
const SETTLE_TIME: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "room-control")]
#[command(about = "AV room controller for serially controlled displays", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the displays connected and read console commands from stdin
    Run,
    /// Power every display on
    Startup,
    /// Power every display off
    Shutdown,
    /// Switch a single display
    Power {
        /// Display id from the configuration
        id: String,
        state: PowerState,
    },
    /// Print the last known state of every display
    Status,
    /// Print the effective configuration (file plus environment)
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PowerState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RoomConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    tracing_setup::init_from_config(&config)
        .map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;

    if let Commands::Config = cli.command {
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    info!(
        room = %config.application.name,
        displays = config.displays.len(),
        "room-control starting"
    );
    let room = Room::spawn(&config)?;
    room.initialize().await?;

    let result = match cli.command {
        Commands::Run => run_console(&room).await,
        Commands::Startup => one_shot(&room, room.startup()).await,
        Commands::Shutdown => one_shot(&room, room.shutdown()).await,
        Commands::Power { id, state } => {
            one_shot(&room, room.power(&id, matches!(state, PowerState::On))).await
        }
        Commands::Status => one_shot(&room, async { Ok(()) }).await,
        Commands::Config => Ok(()),
    };

    room.close().await;
    result
}

async fn one_shot<F>(room: &Room, action: F) -> Result<()>
where
    F: std::future::Future<Output = room_control::RoomResult<()>>,
{
    action.await?;
    tokio::time::sleep(SETTLE_TIME).await;
    print_status(room).await
}

async fn print_status(room: &Room) -> Result<()> {
    for display in room.status().await? {
        println!("{}", display);
    }
    Ok(())
}

async fn run_console(room: &Room) -> Result<()> {
    let mut events = room.events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("* {}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "console fell behind on status events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let result = match command {
            ConsoleCommand::Startup => room.startup().await,
            ConsoleCommand::Shutdown => room.shutdown().await,
            ConsoleCommand::Power { display, on } => room.power(&display, on).await,
            ConsoleCommand::Status => {
                print_status(room).await?;
                Ok(())
            }
            ConsoleCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            ConsoleCommand::Quit => break,
        };
        if let Err(e) = result {
            println!("error: {}", e);
        }
    }

    printer.abort();
    info!("console closed");
    Ok(())
}
