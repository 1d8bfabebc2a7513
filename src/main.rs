//! medconsult - bilingual doctor/patient consultation chat
//!
//! Each participant writes in their own language; messages are translated
//! into the other participant's language through a translation gateway and
//! stored in a room both sides follow.

mod chat;
mod commands;
mod config;
mod gateway;
mod models;
mod store;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::models::Role;

#[derive(Parser)]
#[command(name = "medconsult")]
#[command(about = "Translated doctor/patient consultation chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change this participant's role and language
    Session {
        /// DOCTOR or PATIENT
        #[arg(short, long)]
        role: Option<Role>,

        /// Language code: en, hi, es, fr, de
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Create a new consultation room
    New,

    /// List recent consultations
    Rooms {
        /// Maximum number of rooms to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Send a text message
    Send {
        /// Room ID (from `rooms` or `new` output)
        #[arg(short, long)]
        room: String,

        /// Message content
        message: String,
    },

    /// Send a recorded audio file
    SendAudio {
        /// Room ID
        #[arg(short, long)]
        room: String,

        /// Recording (webm, ogg, wav, mp3, m4a)
        file: PathBuf,
    },

    /// Read messages from a room
    Read {
        /// Room ID
        #[arg(short, long)]
        room: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Search a room's messages
    Search {
        /// Room ID
        #[arg(short, long)]
        room: String,

        /// Text to look for in original or translated messages
        query: String,
    },

    /// Print a medical summary of a room
    Summary {
        /// Room ID
        #[arg(short, long)]
        room: String,
    },

    /// Follow a room live
    Watch {
        /// Room ID
        #[arg(short, long)]
        room: String,

        /// Send stdin lines as messages
        #[arg(short, long)]
        interactive: bool,
    },

    /// Run a scripted English/Spanish consultation in memory
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let command = match cli.command {
        Commands::Session { role, language } => return commands::session(role, language),
        command => command,
    };
    let config = Config::load()?;

    match command {
        Commands::Session { .. } => {}
        Commands::New => {
            commands::new_room(&config).await?;
        }
        Commands::Rooms { limit } => {
            commands::list_rooms(&config, limit).await?;
        }
        Commands::Send { room, message } => {
            tracing::info!("Sending message...");
            commands::send_text(&config, &room, &message).await?;
        }
        Commands::SendAudio { room, file } => {
            commands::send_audio(&config, &room, &file).await?;
        }
        Commands::Read { room, limit } => {
            commands::read_messages(&config, &room, limit).await?;
        }
        Commands::Search { room, query } => {
            commands::search_messages(&config, &room, &query).await?;
        }
        Commands::Summary { room } => {
            commands::summary(&config, &room).await?;
        }
        Commands::Watch { room, interactive } => {
            commands::watch(&config, &room, interactive).await?;
        }
        Commands::Demo => {
            commands::demo(&config).await?;
        }
    }

    Ok(())
}
