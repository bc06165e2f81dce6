//! Inspection CLI for merged configuration
//!
//! `show` materializes the file/env layers for a root package and
//! prints the resolved tree; `check` validates an override file's
//! shape for every channel; `channels` lists the valid channel names.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::channel::Channel;
use crate::context::ConfigContext;
use crate::error::ConfigError;
use crate::store::load_channel_file;

/// Inspect layered configuration trees
#[derive(Parser)]
#[command(name = "confstack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize and print the merged, template-resolved tree
    Show(ShowArgs),

    /// Validate an override file's channel tables
    Check {
        /// Override file (.toml, .yaml, or .yml)
        file: PathBuf,
    },

    /// List the deployment channels
    Channels,
}

#[derive(clap::Args)]
struct ShowArgs {
    /// Root package whose configuration to materialize
    root: String,

    /// Channel to materialize (overrides $CONFSTACK_CHANNEL)
    #[arg(long)]
    channel: Option<String>,

    /// Additional override files, merged above the env-named files
    #[arg(long = "file")]
    files: Vec<PathBuf>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Wire verbose flag to the tracing log level.
    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    match cli.command {
        Commands::Show(args) => show(args),
        Commands::Check { file } => check(&file),
        Commands::Channels => {
            for ch in Channel::ALL {
                if ch == Channel::default() {
                    println!("{ch} (default)");
                } else {
                    println!("{ch}");
                }
            }
            Ok(())
        }
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let mut ctx = ConfigContext::new();
    if let Some(channel) = &args.channel {
        ctx.set_env_var(crate::channel::CHANNEL_ENV, channel);
    }
    for file in args.files {
        ctx.add_file(file);
    }
    ctx.init_all(&args.root)
        .with_context(|| format!("cannot materialize configuration for {}", args.root))?;
    let tree = ctx.tree()?;
    let json = serde_json::Value::Object(
        tree.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
    );
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn check(file: &PathBuf) -> Result<()> {
    let mut found = 0usize;
    for channel in Channel::ALL {
        match load_channel_file(file, channel) {
            Ok(fragment) => {
                let params: usize = fragment
                    .values()
                    .filter_map(|v| v.as_mapping())
                    .flat_map(|subs| subs.values())
                    .filter_map(|v| v.as_mapping())
                    .map(|params| params.len())
                    .sum();
                let noun = if params == 1 { "parameter" } else { "parameters" };
                println!("{channel}: ok ({params} {noun})");
                found += 1;
            }
            Err(ConfigError::MissingChannelTable { .. }) => {
                println!("{channel}: absent");
            }
            Err(e) => return Err(e).with_context(|| format!("{} is invalid", file.display())),
        }
    }
    anyhow::ensure!(found > 0, "{}: no channel tables found", file.display());
    Ok(())
}
