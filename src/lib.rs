//! pass-vault-core: cryptographic engine for a local password manager.
//!
//! This crate holds the vault format, key derivation, and mnemonic
//! recovery protocol only. It is deliberately blind to *where* the vault
//! lives, *how* a password is prompted for, and *how* it's remembered
//! between launches — those are shell concerns, modeled here only as the
//! [`config::ConfigProvider`] and [`keychain::KeychainStore`] traits.
//!
//! # Modules
//!
//! - [`crypto`] — KDF, AEAD, randomness, mnemonic primitives. No I/O, no
//!   state.
//! - [`error`] — the crate-wide [`error::VaultError`] and [`error::Result`].
//! - [`models`] — [`models::CredentialRecord`], the one structure stored
//!   in the encrypted blob.
//! - [`storage`] — the vault file format and atomic on-disk persistence.
//! - [`metadata`] — the `.meta` recovery sidecar format and persistence.
//! - [`vault`] — [`vault::VaultService`], the orchestrating state machine.
//! - [`recovery`] — the partial-knowledge mnemonic recovery protocol.
//! - [`config`] / [`keychain`] — collaborator seams for path resolution
//!   and OS-keychain integration; no concrete shell implementation ships
//!   here beyond test doubles.
//!
//! # Security properties
//!
//! - **KDF**: Argon2id (RFC 9106), per-vault salt and cost parameters.
//! - **Cipher**: AES-256-GCM, 12-byte nonce, 16-byte tag.
//! - **Zeroize**: every secret-bearing buffer is zeroized on every exit
//!   path — lock, error, drop, or completed password change.
//! - **Constant-time comparison** for mnemonic words; the AEAD tag check
//!   is the sole authentication oracle, never a hand-rolled comparison.

pub mod b64;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keychain;
pub mod metadata;
pub mod models;
pub mod recovery;
pub mod storage;
pub mod vault;

pub use error::{Result, VaultError};
pub use vault::VaultService;

/// Test-only tracing setup shared by every module's `#[cfg(test)] mod
/// tests`, so failures surface their `debug!`/`warn!` trail under `cargo
/// test -- --nocapture` instead of going to a subscriber nobody installed.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
  use std::sync::Once;
  static INIT: Once = Once::new();
  INIT.call_once(|| {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
  });
}
