//! passcache - in-memory OpenPGP passphrase cache and operation dispatcher
//!
//! The [`cache`] module keeps unlocked passphrases in memory for a limited
//! time; [`operations`] runs OpenPGP requests against an injected engine,
//! pulling passphrases from the cache and asking the caller for input when
//! none is available.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod keyring;
pub mod operations;
pub mod output;

pub use error::{Error, Result};
