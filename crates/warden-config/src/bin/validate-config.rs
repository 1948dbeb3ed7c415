//! Config validation CLI tool
//!
//! Validates a wardend configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use warden_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a wardend configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match warden_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", warden_config::CURRENT_CONFIG_VERSION);
            println!("  Check interval: {}s", config.service.check_interval.as_secs());
            println!("  Audit retention: {} days", config.service.retention_days);
            match &config.webhook {
                Some(webhook) => println!("  Webhook: {} ({} events)", webhook.url, webhook.events.len()),
                None => println!("  Webhook: disabled"),
            }

            if !config.subjects.is_empty() {
                println!();
                println!("Subjects:");
                for subject in &config.subjects {
                    let schedule = subject
                        .schedule
                        .as_ref()
                        .map(|s| s.describe())
                        .unwrap_or_else(|| "no schedule".to_string());
                    let state = if subject.enabled { "" } else { " (disabled)" };
                    println!("  - {} [{}]: {}{}", subject.id, schedule, subject.name, state);
                }
            }

            if !config.profiles.is_empty() {
                println!();
                println!("Profiles:");
                for profile in &config.profiles {
                    let marker = if profile.active { " *" } else { "" };
                    println!(
                        "  - {} ({} members): {}{}",
                        profile.id,
                        profile.member_ids.len(),
                        profile.name,
                        marker
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                warden_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                warden_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                warden_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                warden_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        warden_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
