//! Crate-wide error type.
//!
//! All cryptographic authentication failures are collapsed into
//! [`VaultError::BadPassword`] or [`VaultError::RecoveryFailed`] before they
//! leave this crate, so callers never get a deny oracle finer than "it
//! didn't work". No variant carries password, mnemonic, key, plaintext, or
//! nonce material in its `Display` output.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
  #[error("incorrect master password")]
  BadPassword,

  #[error("recovery failed: word list or passphrase incorrect")]
  RecoveryFailed,

  #[error("invalid mnemonic{}", .0.map(|i| format!(" at word {i}")).unwrap_or_default())]
  InvalidMnemonic(Option<usize>),

  #[error("no recovery configured for this vault")]
  NoRecoveryConfigured,

  #[error("vault file is corrupt: {0}")]
  CorruptVault(String),

  #[error("unsupported vault version: {0}")]
  UnsupportedVersion(u8),

  #[error("recovery metadata sidecar is missing")]
  SidecarMissing,

  #[error("vault already exists at {0}")]
  AlreadyExists(PathBuf),

  #[error("vault not found at {0}")]
  NotFound(PathBuf),

  #[error("a credential for service {0:?} already exists")]
  DuplicateService(String),

  #[error("vault is locked")]
  Locked,

  #[error("credential not found for service {0:?}")]
  CredentialNotFound(String),

  #[error("i/o error: {0}")]
  Io(String),

  #[error("password change partially applied; vault and recovery metadata may disagree")]
  PartialPasswordChange,

  #[error("entropy source failure, cannot proceed")]
  EntropyFailure,

  #[error("invalid argument: {0}")]
  InvalidArgument(String),
}

impl From<std::io::Error> for VaultError {
  fn from(e: std::io::Error) -> Self {
    VaultError::Io(e.to_string())
  }
}
