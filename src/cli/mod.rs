//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Configuration file selection
//! - Log directory and diagnostic level overrides
//! - Configuration check mode
//! - Help and version commands

use crate::constants::AGENT_VERSION;
use crate::daemon::config::AgentConfiguration;
use crate::daemon::logging::LogLevel;
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub check_config: bool,
}

/// Command definition, shared by `parse_args` and tests
pub fn build_command() -> Command {
    Command::new("hostwatch")
        .version(AGENT_VERSION)
        .about("Host threat monitoring agent")
        .long_about(
            "Watches network connections, processes, protected files, login failures and \
             system log entries, and records security events to a per-run log file.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file (TOML)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log-dir")
                .short('l')
                .long("log-dir")
                .value_name("DIR")
                .help("Directory for security event logs")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Diagnostic log level: error, warn, info, debug, trace"),
        )
        .arg(
            Arg::new("check-config")
                .long("check-config")
                .help("Validate the configuration, print it and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    args_from_matches(&build_command().get_matches())
}

pub fn args_from_matches(matches: &ArgMatches) -> Result<CliArgs> {
    let log_level = match matches.get_one::<String>("log-level") {
        Some(level) => Some(level.parse::<LogLevel>().map_err(|e| anyhow!("{}", e))?),
        None => None,
    };

    Ok(CliArgs {
        config_path: matches.get_one::<PathBuf>("config").cloned(),
        log_dir: matches.get_one::<PathBuf>("log-dir").cloned(),
        log_level,
        check_config: matches.get_flag("check-config"),
    })
}

/// Load the configuration named on the command line, or the default file
/// when it exists, then apply command line overrides and validate.
pub fn resolve_configuration(args: &CliArgs) -> Result<AgentConfiguration> {
    let mut config = match &args.config_path {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("Configuration file not found: {}", path.display()));
            }
            AgentConfiguration::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => match AgentConfiguration::default_config_path() {
            Ok(path) if path.exists() => AgentConfiguration::load_from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            _ => AgentConfiguration::default(),
        },
    };

    if let Some(dir) = &args.log_dir {
        config.agent.log_directory = dir.clone();
    }
    if let Some(level) = args.log_level {
        config.logging.level = level.to_string();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
