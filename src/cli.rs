//! Command-line interface
//!
//! `serve` runs the HTTP server; `sweep` runs the retention sweep once and
//! exits, intended to be invoked hourly by cron or a systemd timer.

use crate::config::ServiceConfig;
use crate::storage::MediaStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Background removal web service
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "cutout-server")]
pub struct Cli {
    /// Increase logging verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Media root directory (holds uploads/ and results/)
        #[arg(long, default_value = "media")]
        media_root: PathBuf,

        /// ONNX model file backing the withoutbg engine
        #[arg(long, default_value = "models/withoutbg.onnx")]
        withoutbg_model: PathBuf,

        /// ONNX model file backing the rembg engine
        #[arg(long, default_value = "models/rembg.onnx")]
        rembg_model: PathBuf,

        /// Maximum accepted upload size in bytes
        #[arg(long, default_value_t = crate::config::DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },

    /// Delete uploaded and result files older than the retention age
    Sweep {
        /// Media root directory (holds uploads/ and results/)
        #[arg(long, default_value = "media")]
        media_root: PathBuf,

        /// Retention age in seconds
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

/// CLI entry point
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve {
            bind,
            media_root,
            withoutbg_model,
            rembg_model,
            max_upload_bytes,
        } => {
            let config = ServiceConfig::builder()
                .bind_addr(bind)
                .media_root(media_root)
                .withoutbg_model(withoutbg_model)
                .rembg_model(rembg_model)
                .max_upload_bytes(max_upload_bytes)
                .build()
                .context("Invalid configuration")?;

            crate::server::start_server(config)
                .await
                .context("Server exited with an error")?;
        },
        Command::Sweep {
            media_root,
            max_age_secs,
        } => {
            let store = MediaStore::new(media_root);
            let report = store.sweep_expired(Duration::from_secs(max_age_secs));
            println!("Successfully deleted {} old files", report.deleted);
        },
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
