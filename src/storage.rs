//! Vault file format and atomic persistence.
//!
//! Wire format (JSON): `{ "metadata": { version, salt, iterations,
//! data_nonce, wrapped_dek?, wrapped_dek_nonce? }, "ciphertext": "<b64>" }`.
//! v1-absent fields are omitted from the object entirely — never emitted
//! as empty strings — per the spec's `omitempty` wire contract.
//!
//! Writes go to `<path>.tmp`, get fsynced, then are renamed over `path`;
//! the containing directory is fsynced too so the rename itself is
//! durable. This never truncates the destination in place, so a crash
//! between the write and the rename leaves the prior file fully usable.

use crate::crypto::KdfCost;
use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// On-disk vault header. Byte fields are base64-encoded at the JSON
/// boundary via [`crate::b64`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultMetadata {
  pub version: u8,
  #[serde(with = "crate::b64")]
  pub salt: Vec<u8>,
  #[serde(rename = "iterations")]
  pub kdf_cost: KdfCost,
  #[serde(with = "crate::b64")]
  pub data_nonce: Vec<u8>,
  #[serde(skip_serializing_if = "Option::is_none", with = "crate::b64::option", default)]
  pub wrapped_dek: Option<Vec<u8>>,
  #[serde(skip_serializing_if = "Option::is_none", with = "crate::b64::option", default)]
  pub wrapped_dek_nonce: Option<Vec<u8>>,
}

/// The full on-disk vault file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultFile {
  pub metadata: VaultMetadata,
  #[serde(with = "crate::b64")]
  pub ciphertext: Vec<u8>,
}

impl VaultFile {
  /// Validates the version-dependent layout invariants from the data
  /// model: v1 must omit the wrapped-DEK fields, v2 must carry both at
  /// their exact lengths.
  pub fn validate_layout(&self) -> Result<()> {
    match self.metadata.version {
      1 => {
        if self.metadata.wrapped_dek.is_some() || self.metadata.wrapped_dek_nonce.is_some() {
          return Err(VaultError::CorruptVault(
            "v1 vault must not carry wrapped_dek fields".into(),
          ));
        }
      }
      2 => {
        let dek = self
          .metadata
          .wrapped_dek
          .as_ref()
          .ok_or_else(|| VaultError::CorruptVault("v2 vault missing wrapped_dek".into()))?;
        let nonce = self
          .metadata
          .wrapped_dek_nonce
          .as_ref()
          .ok_or_else(|| VaultError::CorruptVault("v2 vault missing wrapped_dek_nonce".into()))?;
        if dek.len() != 48 {
          return Err(VaultError::CorruptVault(format!("wrapped_dek must be 48 bytes, got {}", dek.len())));
        }
        if nonce.len() != 12 {
          return Err(VaultError::CorruptVault(format!(
            "wrapped_dek_nonce must be 12 bytes, got {}",
            nonce.len()
          )));
        }
      }
      other => return Err(VaultError::UnsupportedVersion(other)),
    }
    if self.metadata.salt.len() != crate::crypto::SALT_LEN {
      return Err(VaultError::CorruptVault(format!(
        "salt must be {} bytes, got {}",
        crate::crypto::SALT_LEN,
        self.metadata.salt.len()
      )));
    }
    if self.metadata.data_nonce.len() != crate::crypto::NONCE_LEN {
      return Err(VaultError::CorruptVault(format!(
        "data_nonce must be {} bytes, got {}",
        crate::crypto::NONCE_LEN,
        self.metadata.data_nonce.len()
      )));
    }
    Ok(())
  }
}

/// Writes `bytes` to `path` atomically: write to `<path>.tmp`, fsync, then
/// rename over `path`, then fsync the parent directory so the rename
/// itself survives a crash.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
  let tmp_path = tmp_path_for(path);

  {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
  }

  fs::rename(&tmp_path, path)?;

  if let Some(dir) = path.parent() {
    if let Ok(dir_file) = File::open(dir) {
      let _ = dir_file.sync_all();
    }
  }

  Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
  let mut os = path.as_os_str().to_owned();
  os.push(".tmp");
  std::path::PathBuf::from(os)
}

/// Serializes and atomically writes a [`VaultFile`] to `path`.
pub fn save(path: &Path, file: &VaultFile) -> Result<()> {
  file.validate_layout()?;
  let bytes = serde_json::to_vec_pretty(file).map_err(|e| VaultError::CorruptVault(e.to_string()))?;
  atomic_write(path, &bytes)
}

/// Loads and validates a [`VaultFile`] from `path`.
///
/// Returns [`VaultError::NotFound`] if the file doesn't exist,
/// [`VaultError::CorruptVault`] on malformed JSON or layout, and
/// [`VaultError::UnsupportedVersion`] for any version other than 1 or 2.
pub fn load(path: &Path) -> Result<VaultFile> {
  if !path.exists() {
    return Err(VaultError::NotFound(path.to_path_buf()));
  }
  let bytes = fs::read(path)?;
  let file: VaultFile = serde_json::from_slice(&bytes).map_err(|e| VaultError::CorruptVault(e.to_string()))?;
  file.validate_layout()?;
  Ok(file)
}
