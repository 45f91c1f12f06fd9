//! Config validation CLI tool
//!
//! Validates a spectrumd configuration file and reports any errors.

use spectrum_util::default_config_path;
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
            eprintln!("Validates a spectrumd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match spectrum_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", spectrum_config::CURRENT_CONFIG_VERSION);
            println!("  Data dir: {}", config.service.data_dir.display());
            println!("  Socket: {}", config.service.socket_path.display());
            println!("  Max weeks: {}", config.scheduling.max_weeks);
            println!(
                "  Durations: {:?} min",
                config.scheduling.duration_minutes
            );
            if config.registration.coach_telegram_ids.is_empty() {
                println!("  Coach registration: open");
            } else {
                println!(
                    "  Coach registration: {} allowed id(s)",
                    config.registration.coach_telegram_ids.len()
                );
            }

            println!();
            println!("Plans:");
            for plan in &config.plans {
                let validity = match plan.valid_days {
                    Some(days) => format!("{} days", days),
                    None => "no expiry".to_string(),
                };
                println!(
                    "  - {} [{} lessons, {}]: {}",
                    plan.id,
                    plan.lessons,
                    validity,
                    plan.label.replace('\n', " ")
                );
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                spectrum_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                spectrum_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                spectrum_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                spectrum_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        spectrum_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
