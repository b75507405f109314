//! Cutout background removal server
//!
//! Binary entry point for the HTTP server and the retention sweep.

use cutout_server::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
