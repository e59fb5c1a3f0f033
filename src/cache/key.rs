//! Cache key selection
//!
//! Maps a (master key id, subkey id) request onto the slot of the cache store
//! that holds its passphrase.

use crate::error::CacheError;

/// Explicit no-op id: requests for it are never cached.
pub const KEY_ID_NONE: i64 = 0;

/// Shared slot for symmetric (password-only) encryption.
pub const KEY_ID_SYMMETRIC: i64 = -1;

/// Where a request's passphrase lives in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    /// Do not touch the store at all
    Uncached,
    /// Store index
    Key(i64),
}

/// Reject requests mixing the symmetric sentinel with a real key id.
pub fn check_key_pair(master_key_id: i64, sub_key_id: i64) -> Result<(), CacheError> {
    if (master_key_id == KEY_ID_SYMMETRIC) != (sub_key_id == KEY_ID_SYMMETRIC) {
        return Err(CacheError::InvalidKeyPair {
            master: master_key_id,
            sub: sub_key_id,
        });
    }
    Ok(())
}

/// Pick the store index for a request.
///
/// Deterministic in its three inputs. With `cache_by_subkey` off every subkey
/// of a keyring maps to the master key's slot.
pub fn resolve_cache_key(
    master_key_id: i64,
    sub_key_id: i64,
    cache_by_subkey: bool,
) -> Result<CacheSlot, CacheError> {
    check_key_pair(master_key_id, sub_key_id)?;

    if master_key_id == KEY_ID_NONE {
        return Ok(CacheSlot::Uncached);
    }
    if master_key_id == KEY_ID_SYMMETRIC {
        return Ok(CacheSlot::Key(KEY_ID_SYMMETRIC));
    }

    Ok(CacheSlot::Key(if cache_by_subkey {
        sub_key_id
    } else {
        master_key_id
    }))
}
