//! Keyring metadata commands

use colored::Colorize;
use tabled::Tabled;

use crate::cli::{CommandContext, GlobalOptions, KeyringAddArgs, OutputFormat};
use crate::error::{KeyringError, Result};
use crate::keyring::{
    KeyringRecord, KeyringStore, SecretKeyType, SubkeyRecord, format_key_id, parse_key_id,
};
use crate::output;

/// One keyring in table output
#[derive(Debug, Tabled)]
struct KeyringRow {
    #[tabled(rename = "KEY ID")]
    key_id: String,
    #[tabled(rename = "USER ID")]
    user_id: String,
    #[tabled(rename = "SECRET")]
    secret_type: String,
    #[tabled(rename = "SUBKEYS")]
    subkeys: usize,
}

impl From<&KeyringRecord> for KeyringRow {
    fn from(record: &KeyringRecord) -> Self {
        Self {
            key_id: format_key_id(record.master_key_id),
            user_id: record.user_id.clone().unwrap_or_else(|| "-".to_string()),
            secret_type: record
                .subkey(record.master_key_id)
                .map(|s| s.secret_type.to_string())
                .unwrap_or_default(),
            subkeys: record.subkeys.len().saturating_sub(1),
        }
    }
}

fn key_id_arg(value: &str) -> Result<i64> {
    parse_key_id(value)
        .ok_or_else(|| KeyringError::InvalidRecord(format!("not a key id: '{}'", value)).into())
}

/// Parse `ID[:TYPE[:FLAGS]]`. TYPE defaults to passphrase, FLAGS to "e".
fn parse_subkey(value: &str) -> Result<SubkeyRecord> {
    let mut parts = value.splitn(3, ':');
    let key_id = key_id_arg(parts.next().unwrap_or_default())?;

    let secret_type = match parts.next() {
        None | Some("") => SecretKeyType::Passphrase,
        Some(name) => SecretKeyType::parse(&name.replace('-', "_")).ok_or_else(|| {
            KeyringError::InvalidRecord(format!("unknown secret type '{}'", name))
        })?,
    };

    let flags = parts.next().unwrap_or("e");
    if let Some(bad) = flags.chars().find(|c| !matches!(c, 'c' | 's' | 'e')) {
        return Err(KeyringError::InvalidRecord(format!(
            "unknown capability '{}' in '{}'",
            bad, value
        ))
        .into());
    }

    Ok(SubkeyRecord {
        key_id,
        secret_type,
        can_certify: flags.contains('c'),
        can_sign: flags.contains('s'),
        can_encrypt: flags.contains('e'),
    })
}

/// Build the record described by `keyring add` arguments
fn record_from_args(args: &KeyringAddArgs) -> Result<KeyringRecord> {
    let master_key_id = key_id_arg(&args.master_key_id)?;

    let mut subkeys = vec![SubkeyRecord {
        key_id: master_key_id,
        secret_type: args.secret_type,
        can_certify: true,
        can_sign: true,
        can_encrypt: false,
    }];
    for value in &args.subkeys {
        subkeys.push(parse_subkey(value)?);
    }

    let record = KeyringRecord {
        master_key_id,
        user_id: args.user_id.clone(),
        subkeys,
    };
    record.validate()?;
    Ok(record)
}

/// Add or replace a keyring
pub fn add(opts: &GlobalOptions, args: KeyringAddArgs) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let record = record_from_args(&args)?;
    ctx.open_keyring()?.insert_keyring(&record)?;

    match ctx.format {
        OutputFormat::Json => println!("{}", output::json::format_json(&record)?),
        OutputFormat::Table => println!(
            "{} Stored keyring {} with {} subkey(s)",
            "✓".green(),
            format_key_id(record.master_key_id).bold(),
            record.subkeys.len() - 1
        ),
    }
    Ok(())
}

/// List keyrings
pub fn list(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let records = ctx.open_keyring()?.list_keyrings()?;
    let rows: Vec<KeyringRow> = records.iter().map(KeyringRow::from).collect();
    output::print_rows(&rows, &records, ctx.format)
}

/// Remove a keyring
pub fn remove(opts: &GlobalOptions, key_id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let master_key_id = key_id_arg(key_id)?;
    if !ctx.open_keyring()?.delete_keyring(master_key_id)? {
        return Err(KeyringError::NotFound(master_key_id).into());
    }

    match ctx.format {
        OutputFormat::Json => println!(
            "{}",
            output::json::format_json(&serde_json::json!({ "removed": master_key_id }))?
        ),
        OutputFormat::Table => println!(
            "{} Removed keyring {}",
            "✓".green(),
            format_key_id(master_key_id)
        ),
    }
    Ok(())
}

/// Print the keyring database path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    println!("{}", ctx.keyring_path.display());
    Ok(())
}
