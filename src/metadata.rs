//! Recovery metadata sidecar.
//!
//! Lives next to the vault file at `<vault_path>.meta`, stable derivation,
//! and exists iff recovery is enabled. A missing sidecar when the vault
//! claims v2-with-recovery is a hard error; a missing sidecar for v1 (or
//! v2 without recovery) is normal and simply means recovery isn't set up.

use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Argon2id cost parameters used by the recovery subsystem's two
/// derivations (challenge key, recovery key). Kept distinct from the
/// vault's own [`crate::crypto::KdfCost`] serialization so the sidecar's
/// `algorithm`/`time`/`memory`/`threads` field names match spec's §3
/// schema exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoveryKdf {
  pub algorithm: String,
  pub time: u32,
  pub memory: u32,
  pub threads: u32,
  #[serde(with = "crate::b64")]
  pub salt_challenge: Vec<u8>,
  #[serde(with = "crate::b64")]
  pub salt_recovery: Vec<u8>,
}

impl RecoveryKdf {
  pub fn new(cost: crate::crypto::KdfCost, salt_challenge: Vec<u8>, salt_recovery: Vec<u8>) -> Self {
    Self {
      algorithm: "argon2id".to_string(),
      time: cost.iterations,
      memory: cost.memory_kib,
      threads: cost.parallelism,
      salt_challenge,
      salt_recovery,
    }
  }

  pub fn cost(&self) -> crate::crypto::KdfCost {
    crate::crypto::KdfCost {
      memory_kib: self.memory,
      iterations: self.time,
      parallelism: self.threads,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoveryConfig {
  pub enabled: bool,
  pub version: String,
  pub challenge_positions: Vec<u8>,
  #[serde(with = "crate::b64")]
  pub encrypted_stored_words: Vec<u8>,
  #[serde(with = "crate::b64")]
  pub nonce_stored: Vec<u8>,
  #[serde(with = "crate::b64")]
  pub encrypted_recovery_key: Vec<u8>,
  #[serde(with = "crate::b64")]
  pub nonce_recovery: Vec<u8>,
  pub kdf: RecoveryKdf,
  pub passphrase_required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultMetadataSidecar {
  pub recovery: RecoveryConfig,
}

impl RecoveryConfig {
  /// Validates the structural invariants from spec §8: 6 distinct
  /// challenge positions in `[0, 24)`, and all salts/nonces at their
  /// fixed lengths.
  pub fn validate(&self) -> Result<()> {
    if self.version != "2" {
      return Err(VaultError::CorruptVault(format!("unsupported recovery.version {:?}", self.version)));
    }
    if self.challenge_positions.len() != 6 {
      return Err(VaultError::CorruptVault("challenge_positions must have 6 entries".into()));
    }
    if self.challenge_positions.iter().any(|&p| p >= 24) {
      return Err(VaultError::CorruptVault("challenge_positions must be in [0,24)".into()));
    }
    let mut sorted = self.challenge_positions.clone();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != 6 {
      return Err(VaultError::CorruptVault("challenge_positions must be distinct".into()));
    }
    if self.nonce_stored.len() != 12 || self.nonce_recovery.len() != 12 {
      return Err(VaultError::CorruptVault("recovery nonces must be 12 bytes".into()));
    }
    if self.kdf.salt_challenge.len() != 32 || self.kdf.salt_recovery.len() != 32 {
      return Err(VaultError::CorruptVault("recovery KDF salts must be 32 bytes".into()));
    }
    Ok(())
  }
}

/// Derives the sidecar path from the vault path: `<vault_path>.meta`.
pub fn metadata_path(vault_path: &Path) -> PathBuf {
  let mut os = vault_path.as_os_str().to_owned();
  os.push(".meta");
  PathBuf::from(os)
}

pub fn save_metadata(vault_path: &Path, sidecar: &VaultMetadataSidecar) -> Result<()> {
  sidecar.recovery.validate()?;
  let path = metadata_path(vault_path);
  let bytes = serde_json::to_vec_pretty(sidecar).map_err(|e| VaultError::CorruptVault(e.to_string()))?;
  crate::storage::atomic_write(&path, &bytes)
}

/// Loads the sidecar for `vault_path`. `required` should be `true` when
/// the caller already knows the vault is v2-with-recovery, in which case
/// a missing sidecar is [`VaultError::SidecarMissing`] rather than
/// [`VaultError::NotFound`].
pub fn load_metadata(vault_path: &Path, required: bool) -> Result<Option<VaultMetadataSidecar>> {
  let path = metadata_path(vault_path);
  if !path.exists() {
    return if required { Err(VaultError::SidecarMissing) } else { Ok(None) };
  }
  let bytes = std::fs::read(&path)?;
  let sidecar: VaultMetadataSidecar = serde_json::from_slice(&bytes).map_err(|e| VaultError::CorruptVault(e.to_string()))?;
  sidecar.recovery.validate()?;
  Ok(Some(sidecar))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::KdfCost;

  fn sample() -> VaultMetadataSidecar {
    VaultMetadataSidecar {
      recovery: RecoveryConfig {
        enabled: true,
        version: "2".to_string(),
        challenge_positions: vec![0, 3, 7, 11, 15, 20],
        encrypted_stored_words: vec![1u8; 32],
        nonce_stored: vec![2u8; 12],
        encrypted_recovery_key: vec![3u8; 48],
        nonce_recovery: vec![4u8; 12],
        kdf: RecoveryKdf::new(KdfCost::for_tests(), vec![5u8; 32], vec![6u8; 32]),
        passphrase_required: false,
      },
    }
  }

  #[test]
  fn metadata_path_appends_dot_meta() {
    let p = metadata_path(Path::new("/tmp/vault.json"));
    assert_eq!(p, Path::new("/tmp/vault.json.meta"));
  }

  #[test]
  fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let vault_path = dir.path().join("vault.json");
    let sidecar = sample();
    save_metadata(&vault_path, &sidecar).unwrap();

    let loaded = load_metadata(&vault_path, true).unwrap().unwrap();
    assert!(loaded.recovery.enabled);
    assert_eq!(loaded.recovery.challenge_positions.len(), 6);
  }

  #[test]
  fn missing_sidecar_not_required_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let vault_path = dir.path().join("vault.json");
    assert!(load_metadata(&vault_path, false).unwrap().is_none());
  }

  #[test]
  fn missing_sidecar_required_is_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let vault_path = dir.path().join("vault.json");
    assert!(matches!(load_metadata(&vault_path, true), Err(VaultError::SidecarMissing)));
  }

  #[test]
  fn rejects_wrong_position_count() {
    let mut s = sample();
    s.recovery.challenge_positions = vec![0, 1, 2];
    assert!(s.recovery.validate().is_err());
  }

  #[test]
  fn rejects_duplicate_positions() {
    let mut s = sample();
    s.recovery.challenge_positions = vec![0, 0, 1, 2, 3, 4];
    assert!(s.recovery.validate().is_err());
  }

  #[test]
  fn rejects_out_of_range_position() {
    let mut s = sample();
    s.recovery.challenge_positions = vec![0, 1, 2, 3, 4, 24];
    assert!(s.recovery.validate().is_err());
  }
}
