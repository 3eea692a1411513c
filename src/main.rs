#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use hostwatch::cli;
use hostwatch::daemon::{self, logging};

fn main() -> Result<()> {
    let args = cli::parse_args()?;
    let config = cli::resolve_configuration(&args)?;

    if args.check_config {
        print!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    // Level was validated by resolve_configuration
    let level = config.logging.level.parse().unwrap_or(logging::LogLevel::Warn);
    logging::init(level);

    config
        .ensure_directories()
        .context("Failed to create required directories")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(daemon::run_agent(config))
}
