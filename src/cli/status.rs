//! Status command implementation

use colored::Colorize;
use serde::Serialize;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::config::{Config, Preferences};
use crate::error::Result;
use crate::keyring::KeyringStore;
use crate::output::{json::format_json, table::format_key_values};

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    config_path: String,
    config_found: bool,
    keyring_path: String,
    /// Absent when the database does not exist yet
    #[serde(skip_serializing_if = "Option::is_none")]
    keyrings: Option<usize>,
    preferences: &'a Preferences,
}

/// Human-readable TTL; 0 means entries stay until cleared
pub fn describe_ttl(seconds: u64) -> String {
    match seconds {
        0 => "until cleared".to_string(),
        s if s % 3600 == 0 => format!("{} h", s / 3600),
        s if s % 60 == 0 => format!("{} min", s / 60),
        s => format!("{} s", s),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Display configuration, keyring location and cache preferences
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;
    let config_found = config_path.exists();
    let ctx = CommandContext::new(opts)?;

    // Don't create the database just to count it
    let keyrings = if ctx.keyring_path.exists() {
        Some(ctx.open_keyring()?.list_keyrings()?.len())
    } else {
        None
    };
    let prefs = ctx.preferences();

    if ctx.format == OutputFormat::Json {
        let view = StatusView {
            config_path: config_path.display().to_string(),
            config_found,
            keyring_path: ctx.keyring_path.display().to_string(),
            keyrings,
            preferences: prefs,
        };
        println!("{}", format_json(&view)?);
        return Ok(());
    }

    println!("{}\n", "passcache Status".bold());
    if config_found {
        println!("{} Config file: {}", "✓".green(), config_path.display().to_string().cyan());
    } else {
        println!(
            "{} No config file at {} (using defaults)",
            "○".dimmed(),
            config_path.display().to_string().cyan()
        );
    }
    match keyrings {
        Some(count) => println!(
            "{} Keyring database: {} ({} keyring(s))",
            "✓".green(),
            ctx.keyring_path.display().to_string().cyan(),
            count
        ),
        None => {
            println!(
                "{} Keyring database not created yet: {}",
                "○".dimmed(),
                ctx.keyring_path.display().to_string().cyan()
            );
            println!("  → Run 'passcache keyring add' to register a key");
        }
    }

    println!();
    println!(
        "{}",
        format_key_values(&[
            ("Cache TTL", describe_ttl(prefs.cache_ttl_seconds)),
            ("Cache by subkey", yes_no(prefs.cache_by_subkey).to_string()),
            (
                "Default hardware PIN",
                yes_no(prefs.use_default_hardware_pin).to_string()
            ),
            ("Lookup timeout", format!("{} ms", prefs.get_timeout_ms)),
        ])
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_ttl() {
        assert_eq!(describe_ttl(0), "until cleared");
        assert_eq!(describe_ttl(300), "5 min");
        assert_eq!(describe_ttl(3 * 3600), "3 h");
        assert_eq!(describe_ttl(90), "90 s");
    }
}
