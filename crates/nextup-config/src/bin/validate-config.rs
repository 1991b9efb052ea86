//! Config validation CLI tool
//!
//! Validates a nextupd configuration file and reports any errors.

use nextup_config::{ConfigError, CURRENT_CONFIG_VERSION};
use nextup_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a nextupd configuration file.");
            eprintln!();
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match nextup_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            match &settings.feed.url {
                Some(url) => println!("  Feed: {} ({} days)", url, settings.feed.days_ahead),
                None => println!("  Feed: not configured"),
            }
            println!(
                "  Fetch timeout: {}",
                format_duration(settings.feed.fetch_timeout)
            );
            println!(
                "  Scheduler: buffer {}, fallback {}",
                format_duration(settings.scheduler.buffer),
                format_duration(settings.scheduler.fallback)
            );
            println!(
                "  Notifications: {}",
                if settings.preferences.notifications_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
