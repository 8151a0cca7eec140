//! `munibot` command: renders aerial images of administrative regions masked to
//! their boundary and posts them to the profile's bot account.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use munibot_core::config::Config;

use crate::commands::Runner;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "munibot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the image of a region and save it locally
    Create {
        /// Profile to render with
        profile: String,
        /// Region to render, the profile picks the next one when omitted
        #[arg(short, long)]
        id: Option<String>,
        /// Directory the image is written to, defaults to the current one
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Render the image of a region and post it
    Post {
        /// Profile to post with
        profile: String,
        /// Region to post, the profile picks the next one when omitted
        #[arg(short, long)]
        id: Option<String>,
        /// Also keep a copy of the image in this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// List the available profiles
    Profiles,
    /// Print the posting progress of a profile as a JavaScript file for the map app
    Dump {
        /// Profile to dump
        profile: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let runner = Runner::new(config).context("setting up profiles")?;

    match cli.command {
        Command::Create {
            profile,
            id,
            output_dir,
        } => runner.create(&profile, id, output_dir.as_deref()).await,
        Command::Post {
            profile,
            id,
            output_dir,
        } => runner.post(&profile, id, output_dir.as_deref()).await,
        Command::Profiles => runner.profiles(),
        Command::Dump { profile } => runner.dump(&profile).await,
    }
}
