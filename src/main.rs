use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use backup_client::cli::Cli;
use backup_client::transfer::round_to_millis;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "backup_client=debug" } else { "backup_client=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.client_config();
    let report = backup_client::run(&config)
        .await
        .with_context(|| format!("Backup using {} failed", config.transfer_info.display()))?;

    println!(
        "✓ {} backed up ({} bytes, {} chunks, checksum {}) in {}",
        report.file_name,
        report.bytes,
        report.chunks,
        report.checksum,
        humantime::format_duration(round_to_millis(report.elapsed))
    );
    Ok(())
}
