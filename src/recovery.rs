//! Mnemonic-based recovery protocol.
//!
//! Two independently-encrypted secrets live in the metadata sidecar:
//!
//! - `encrypted_stored_words`, under `challenge_key = Argon2id(password,
//!   salt_challenge)`. This lets an already-unlocked vault (password known)
//!   let the user rehearse their backup without holding the mnemonic in
//!   memory. It plays no part in forgot-password recovery.
//! - `encrypted_recovery_key`, under `recovery_key = Argon2id(canonical
//!   6-challenge-word string [+ 0x00 + passphrase], salt_recovery)`. This
//!   wraps the DEK and *is* the forgot-password path: proving you can
//!   reproduce those 6 words (and the passphrase, when required) is
//!   authentication, verified purely by whether the AEAD tag on
//!   `encrypted_recovery_key` checks out.
//!
//! See `DESIGN.md` for why `recovery_key` is derived from the 6 challenge
//! words rather than the full 24-word mnemonic (spec.md is internally
//! inconsistent on this point between §4.4 and §4.5; the 6-word derivation
//! is the only one consistent with "partial-knowledge challenge").

use crate::crypto::{self, KdfCost};
use crate::error::{Result, VaultError};
use crate::metadata::{self, RecoveryConfig, RecoveryKdf, VaultMetadataSidecar};
use crate::storage;
use bip39::Mnemonic;
use std::path::Path;
use zeroize::Zeroizing;

/// Number of words the user must recall to pass the challenge.
pub const CHALLENGE_WORD_COUNT: usize = 6;

/// Joins the words at `positions` (in the given order) into the canonical
/// lowercase-ASCII, single-space-separated form the spec's §4.5 describes.
/// Zeroizing because this is the claimed mnemonic-word plaintext.
pub fn canonical_stored_words(words: &[String]) -> Zeroizing<String> {
  Zeroizing::new(words.iter().map(|w| crypto::canonical_word(w)).collect::<Vec<_>>().join(" "))
}

/// Builds the Argon2id input for the recovery key: the canonical 6-word
/// string, plus (iff a passphrase is supplied) a 0x00 separator and the
/// passphrase bytes. Absent and empty-string passphrases are deliberately
/// distinct inputs.
fn recovery_key_input(stored_words_canonical: &str, passphrase: Option<&str>) -> Zeroizing<String> {
  Zeroizing::new(match passphrase {
    Some(p) => format!("{stored_words_canonical}\u{0}{p}"),
    None => stored_words_canonical.to_string(),
  })
}

fn derive_recovery_key(stored_words_canonical: &str, passphrase: Option<&str>, salt: &[u8; 32], cost: KdfCost) -> Result<Zeroizing<[u8; 32]>> {
  let input = recovery_key_input(stored_words_canonical, passphrase);
  crypto::kdf(&input, salt, cost)
}

fn derive_challenge_key(password: &str, salt: &[u8; 32], cost: KdfCost) -> Result<Zeroizing<[u8; 32]>> {
  crypto::kdf(password, salt, cost)
}

fn words_at_positions(mnemonic: &Mnemonic, positions: &[u8]) -> Vec<String> {
  let words: Vec<&str> = mnemonic.word_iter().collect();
  positions.iter().map(|&p| words[p as usize].to_string()).collect()
}

/// Everything [`crate::vault::VaultService::initialize_with_recovery`]
/// needs to persist, plus the mnemonic phrase shown to the caller exactly
/// once.
pub struct RecoverySetup {
  pub config: RecoveryConfig,
  pub mnemonic_phrase: String,
  pub challenge_positions: Vec<u8>,
}

/// Generates a fresh mnemonic, draws challenge positions, and builds the
/// full [`RecoveryConfig`] wrapping `dek`.
pub fn build_recovery_config(password: &str, dek: &[u8; 32], passphrase: Option<&str>, cost: KdfCost) -> Result<RecoverySetup> {
  let generated = crypto::mnemonic_generate()?;
  let mnemonic_phrase = generated.mnemonic.to_string();

  let positions_usize = crypto::random_distinct_indices(24, CHALLENGE_WORD_COUNT);
  let challenge_positions: Vec<u8> = positions_usize.iter().map(|&p| p as u8).collect();
  let stored_words = words_at_positions(&generated.mnemonic, &challenge_positions);
  let stored_words_canonical = canonical_stored_words(&stored_words);

  let salt_challenge = crypto::random_bytes::<32>();
  let challenge_key = derive_challenge_key(password, &salt_challenge, cost)?;
  let nonce_stored = crypto::random_bytes::<12>();
  let encrypted_stored_words = crypto::encrypt(&challenge_key, &nonce_stored, stored_words_canonical.as_bytes())?;

  let salt_recovery = crypto::random_bytes::<32>();
  let recovery_key = derive_recovery_key(&stored_words_canonical, passphrase, &salt_recovery, cost)?;
  let nonce_recovery = crypto::random_bytes::<12>();
  let encrypted_recovery_key = crypto::encrypt(&recovery_key, &nonce_recovery, dek)?;

  let config = RecoveryConfig {
    enabled: true,
    version: "2".to_string(),
    challenge_positions: challenge_positions.clone(),
    encrypted_stored_words,
    nonce_stored: nonce_stored.to_vec(),
    encrypted_recovery_key,
    nonce_recovery: nonce_recovery.to_vec(),
    kdf: RecoveryKdf::new(cost, salt_challenge.to_vec(), salt_recovery.to_vec()),
    passphrase_required: passphrase.is_some(),
  };

  Ok(RecoverySetup {
    config,
    mnemonic_phrase,
    challenge_positions,
  })
}

/// Stateless post-init confirmation: compares `provided` against the
/// actual words at `positions` in `mnemonic`, in constant time. Does not
/// touch disk; the caller drives retry counting.
pub fn verify_mnemonic(mnemonic: &Mnemonic, positions: &[u8], provided: &[String; CHALLENGE_WORD_COUNT]) -> bool {
  let actual = words_at_positions(mnemonic, positions);
  let actual_canonical = canonical_stored_words(&actual);
  let provided_vec: Vec<String> = provided.to_vec();
  let provided_canonical = canonical_stored_words(&provided_vec);
  crypto::const_eq(actual_canonical.as_bytes(), provided_canonical.as_bytes())
}

/// Recovers a vault without the master password: the caller proves
/// knowledge of the 6 challenge words (and passphrase, if required), the
/// DEK is unwrapped, rewrapped under `new_password`, and the challenge
/// material is re-encrypted so future challenges use the new password.
/// The mnemonic itself, and `encrypted_recovery_key`, are never touched.
pub fn recover(path: &Path, provided_words: &[String; CHALLENGE_WORD_COUNT], new_password: &str, passphrase: Option<&str>) -> Result<()> {
  tracing::debug!(path = %path.display(), "recovery attempt requested");
  let mut vault_file = storage::load(path)?;
  let mut sidecar = metadata::load_metadata(path, false)?.ok_or(VaultError::NoRecoveryConfigured)?;
  if !sidecar.recovery.enabled {
    return Err(VaultError::NoRecoveryConfigured);
  }

  let stored_words_canonical = canonical_stored_words(&provided_words.to_vec());

  let mut salt_recovery = [0u8; 32];
  salt_recovery.copy_from_slice(&sidecar.recovery.kdf.salt_recovery);
  let recovery_key = derive_recovery_key(&stored_words_canonical, passphrase, &salt_recovery, sidecar.recovery.kdf.cost())?;

  let mut nonce_recovery = [0u8; 12];
  nonce_recovery.copy_from_slice(&sidecar.recovery.nonce_recovery);

  let dek_bytes = crypto::decrypt(&recovery_key, &nonce_recovery, &sidecar.recovery.encrypted_recovery_key).map_err(|_| {
    tracing::warn!(path = %path.display(), "recovery attempt failed: challenge words or passphrase incorrect");
    VaultError::RecoveryFailed
  })?;
  if dek_bytes.len() != 32 {
    return Err(VaultError::RecoveryFailed);
  }
  let mut dek = [0u8; 32];
  dek.copy_from_slice(&dek_bytes);

  // Rewrap the DEK under a fresh password-derived KEK.
  let new_salt = crypto::random_bytes::<32>();
  let cost = vault_file.metadata.kdf_cost;
  let kek_new = crypto::kdf(new_password, &new_salt, cost)?;
  let new_wrapped_dek_nonce = crypto::random_bytes::<12>();
  let wrapped_dek_new = crypto::encrypt(&kek_new, &new_wrapped_dek_nonce, &dek)?;

  vault_file.metadata.salt = new_salt.to_vec();
  vault_file.metadata.wrapped_dek = Some(wrapped_dek_new);
  vault_file.metadata.wrapped_dek_nonce = Some(new_wrapped_dek_nonce.to_vec());
  storage::save(path, &vault_file)?;

  // Re-encrypt the challenge material under the new password so future
  // challenges (and change_password's re-wrap) work going forward.
  let new_salt_challenge = crypto::random_bytes::<32>();
  let challenge_key_new = derive_challenge_key(new_password, &new_salt_challenge, cost)?;
  let new_nonce_stored = crypto::random_bytes::<12>();
  let encrypted_stored_words_new = crypto::encrypt(&challenge_key_new, &new_nonce_stored, stored_words_canonical.as_bytes())?;

  sidecar.recovery.kdf.salt_challenge = new_salt_challenge.to_vec();
  sidecar.recovery.encrypted_stored_words = encrypted_stored_words_new;
  sidecar.recovery.nonce_stored = new_nonce_stored.to_vec();
  metadata::save_metadata(path, &sidecar)?;

  Ok(())
}

/// Returns `Ok(true)` iff `path` has recovery configured and enabled.
pub fn has_recovery(path: &Path) -> Result<bool> {
  Ok(metadata::load_metadata(path, false)?.map(|s| s.recovery.enabled).unwrap_or(false))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::KdfCost;
  use crate::vault::VaultService;

  fn temp_vault_path() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.json");
    (dir, path)
  }

  #[test]
  fn build_and_verify_round_trip() {
    let dek = [5u8; 32];
    let setup = build_recovery_config("hunter2", &dek, None, KdfCost::for_tests()).unwrap();
    let mnemonic = Mnemonic::parse_in_normalized(bip39::Language::English, &setup.mnemonic_phrase).unwrap();

    let words = words_at_positions(&mnemonic, &setup.challenge_positions);
    let provided: [String; 6] = words.try_into().unwrap();
    assert!(verify_mnemonic(&mnemonic, &setup.challenge_positions, &provided));
  }

  #[test]
  fn verify_mnemonic_rejects_wrong_word() {
    let dek = [5u8; 32];
    let setup = build_recovery_config("hunter2", &dek, None, KdfCost::for_tests()).unwrap();
    let mnemonic = Mnemonic::parse_in_normalized(bip39::Language::English, &setup.mnemonic_phrase).unwrap();

    let mut words = words_at_positions(&mnemonic, &setup.challenge_positions);
    words[0] = "abandon".to_string();
    let provided: [String; 6] = words.try_into().unwrap();
    assert!(!verify_mnemonic(&mnemonic, &setup.challenge_positions, &provided));
  }

  fn init_with_recovery(path: &Path, password: &str, passphrase: Option<&str>) -> (VaultService, String, Vec<u8>) {
    let (service, phrase) = VaultService::initialize_with_recovery(path, password, passphrase, None).unwrap();
    let sidecar = metadata::load_metadata(path, true).unwrap().unwrap();
    (service, phrase, sidecar.recovery.challenge_positions)
  }

  #[test]
  fn recover_succeeds_with_correct_words_and_allows_new_password() {
    crate::init_test_tracing();
    let (_dir, path) = temp_vault_path();
    let (_service, phrase, positions) = init_with_recovery(&path, "OldPass123!", None);

    let mnemonic = Mnemonic::parse_in_normalized(bip39::Language::English, &phrase).unwrap();
    let words = words_at_positions(&mnemonic, &positions);
    let provided: [String; 6] = words.try_into().unwrap();

    recover(&path, &provided, "NewPass456!", None).unwrap();

    let mut unlocked = VaultService::new(&path);
    assert!(unlocked.unlock("NewPass456!").is_ok());

    let mut old_attempt = VaultService::new(&path);
    assert!(old_attempt.unlock("OldPass123!").is_err());
  }

  #[test]
  fn recover_fails_with_wrong_word() {
    let (_dir, path) = temp_vault_path();
    let (_service, phrase, positions) = init_with_recovery(&path, "OldPass123!", None);

    let mnemonic = Mnemonic::parse_in_normalized(bip39::Language::English, &phrase).unwrap();
    let mut words = words_at_positions(&mnemonic, &positions);
    words[0] = "abandon".to_string();
    let provided: [String; 6] = words.try_into().unwrap();

    assert!(matches!(recover(&path, &provided, "NewPass456!", None), Err(VaultError::RecoveryFailed)));

    let mut old_attempt = VaultService::new(&path);
    assert!(old_attempt.unlock("OldPass123!").is_ok());
  }

  #[test]
  fn recover_requires_passphrase_when_configured() {
    let (_dir, path) = temp_vault_path();
    let (_service, phrase, positions) = init_with_recovery(&path, "OldPass123!", Some("my-25th-word"));

    let mnemonic = Mnemonic::parse_in_normalized(bip39::Language::English, &phrase).unwrap();
    let words = words_at_positions(&mnemonic, &positions);
    let provided: [String; 6] = words.try_into().unwrap();

    assert!(matches!(recover(&path, &provided, "NewPass456!", None), Err(VaultError::RecoveryFailed)));
    assert!(recover(&path, &provided, "NewPass456!", Some("my-25th-word")).is_ok());
  }

  #[test]
  fn recover_without_configuration_is_rejected() {
    let (_dir, path) = temp_vault_path();
    VaultService::initialize(&path, "Solo-Pass!", false, None).unwrap();

    let provided: [String; 6] = std::array::from_fn(|_| "abandon".to_string());
    assert!(matches!(recover(&path, &provided, "NewPass!", None), Err(VaultError::NoRecoveryConfigured)));
  }
}
