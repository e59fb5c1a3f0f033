//! SQLite-backed keyring metadata store
//!
//! Stores keyrings and their subkeys' secret types. No key material and no
//! passphrase is ever written here.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KeyringRecord, KeyringStore, SecretKeyType, SubkeyRecord};
use crate::error::KeyringError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

type Result<T> = std::result::Result<T, KeyringError>;

/// Keyring store kept in a single SQLite database file.
///
/// The connection is wrapped in a Mutex so the store can be shared with the
/// cache service and operation workers.
pub struct SqliteKeyring {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteKeyring {
    /// Get the default database path (~/.local/share/passcache/keyring.db on Linux)
    pub fn default_path() -> Result<PathBuf> {
        let data_base = dirs::data_dir().ok_or(KeyringError::NoHome)?;
        Ok(data_base.join("passcache").join("keyring.db"))
    }

    /// Open or create the keyring at the default location
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::default_path()?)
    }

    /// Open or create the keyring database at `path`
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KeyringError::Io(format!("Failed to create keyring dir: {}", e)))?;
        }

        let conn = Connection::open(path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Keyring schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(path)
                .map_err(|e| KeyringError::Io(format!("Failed to remove keyring DB: {}", e)))?;
            return Self::open_at(path);
        }

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS keyrings (
                master_key_id INTEGER PRIMARY KEY NOT NULL,
                user_id TEXT
            );

            CREATE TABLE IF NOT EXISTS subkeys (
                key_id INTEGER NOT NULL,
                master_key_id INTEGER NOT NULL
                    REFERENCES keyrings(master_key_id) ON DELETE CASCADE,
                rank INTEGER NOT NULL,
                secret_type TEXT NOT NULL,
                can_certify INTEGER NOT NULL,
                can_sign INTEGER NOT NULL,
                can_encrypt INTEGER NOT NULL,
                PRIMARY KEY (master_key_id, key_id)
            );

            CREATE INDEX IF NOT EXISTS idx_subkeys_master ON subkeys(master_key_id);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a keyring and all of its subkeys
    pub fn insert_keyring(&self, record: &KeyringRecord) -> Result<()> {
        record.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM subkeys WHERE master_key_id = ?1",
            [record.master_key_id],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO keyrings (master_key_id, user_id) VALUES (?1, ?2)",
            params![record.master_key_id, record.user_id],
        )?;
        for (rank, subkey) in record.subkeys.iter().enumerate() {
            tx.execute(
                "INSERT INTO subkeys
                 (key_id, master_key_id, rank, secret_type, can_certify, can_sign, can_encrypt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    subkey.key_id,
                    record.master_key_id,
                    rank as i64,
                    subkey.secret_type.as_str(),
                    subkey.can_certify,
                    subkey.can_sign,
                    subkey.can_encrypt
                ],
            )?;
        }
        tx.commit()?;

        log::debug!(
            "Stored keyring {} with {} subkeys",
            super::format_key_id(record.master_key_id),
            record.subkeys.len()
        );
        Ok(())
    }

    /// Delete a keyring, returning whether it existed
    pub fn delete_keyring(&self, master_key_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM subkeys WHERE master_key_id = ?1",
            [master_key_id],
        )?;
        let deleted = conn.execute(
            "DELETE FROM keyrings WHERE master_key_id = ?1",
            [master_key_id],
        )?;
        Ok(deleted > 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KeyringError::Storage("keyring connection lock poisoned".to_string()))
    }

    fn load_subkeys(conn: &Connection, master_key_id: i64) -> Result<Vec<SubkeyRecord>> {
        let mut stmt = conn.prepare(
            "SELECT key_id, secret_type, can_certify, can_sign, can_encrypt
             FROM subkeys WHERE master_key_id = ?1 ORDER BY rank",
        )?;
        let rows = stmt.query_map([master_key_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut subkeys = Vec::new();
        for row in rows {
            let (key_id, secret_type, can_certify, can_sign, can_encrypt) = row?;
            let secret_type = SecretKeyType::parse(&secret_type).ok_or_else(|| {
                KeyringError::InvalidRecord(format!("unknown secret type '{}'", secret_type))
            })?;
            subkeys.push(SubkeyRecord {
                key_id,
                secret_type,
                can_certify,
                can_sign,
                can_encrypt,
            });
        }
        Ok(subkeys)
    }
}

impl KeyringStore for SqliteKeyring {
    fn secret_key_type(&self, master_key_id: i64, sub_key_id: i64) -> Result<SecretKeyType> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT secret_type FROM subkeys WHERE master_key_id = ?1 AND key_id = ?2",
                params![master_key_id, sub_key_id],
                |r| r.get(0),
            )
            .optional()?;

        let value = value.ok_or(KeyringError::NotFound(sub_key_id))?;
        SecretKeyType::parse(&value)
            .ok_or_else(|| KeyringError::InvalidRecord(format!("unknown secret type '{}'", value)))
    }

    fn primary_user_id(&self, master_key_id: i64) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT user_id FROM keyrings WHERE master_key_id = ?1",
            [master_key_id],
            |r| r.get::<_, Option<String>>(0),
        )
        .optional()?
        .ok_or(KeyringError::NotFound(master_key_id))
    }

    fn keyring(&self, master_key_id: i64) -> Result<KeyringRecord> {
        let conn = self.lock()?;
        let user_id: Option<String> = conn
            .query_row(
                "SELECT user_id FROM keyrings WHERE master_key_id = ?1",
                [master_key_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or(KeyringError::NotFound(master_key_id))?;

        Ok(KeyringRecord {
            master_key_id,
            user_id,
            subkeys: Self::load_subkeys(&conn, master_key_id)?,
        })
    }

    fn list_keyrings(&self) -> Result<Vec<KeyringRecord>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT master_key_id, user_id FROM keyrings ORDER BY master_key_id")?;
        let heads: Vec<(i64, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        heads
            .into_iter()
            .map(|(master_key_id, user_id)| {
                Ok(KeyringRecord {
                    master_key_id,
                    user_id,
                    subkeys: Self::load_subkeys(&conn, master_key_id)?,
                })
            })
            .collect()
    }
}
