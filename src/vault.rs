//! Vault service: the state machine that owns a decrypted credential set
//! in memory and every mutation to it.
//!
//! `Sealed -> Unlocked -> (Sealed via lock | Tombstoned via a fatal
//! corruption)`. Only one `VaultService` should be live against a given
//! path at a time — the engine assumes single-writer, single-process
//! access, same as the teacher's `AppState`.

use crate::crypto::{self, KdfCost};
use crate::error::{Result, VaultError};
use crate::keychain::KeychainTarget;
use crate::metadata::{self, VaultMetadataSidecar};
use crate::models::CredentialRecord;
use crate::recovery;
use crate::storage::{self, VaultFile, VaultMetadata};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

/// Consecutive wrong-password attempts allowed before a cooldown kicks in.
const MAX_FAILED_ATTEMPTS: u32 = 5;
/// Cooldown duration once [`MAX_FAILED_ATTEMPTS`] is reached.
const LOCKOUT_DURATION: Duration = Duration::from_secs(30);

/// Tracks consecutive unlock failures and enforces a cooldown, mirroring
/// the teacher's rate limiter but scoped to a single `VaultService`
/// instance instead of a shared `Arc<Mutex<_>>` map.
#[derive(Default)]
struct FailedAttemptTracker {
  failed_count: u32,
  locked_until: Option<Instant>,
}

impl FailedAttemptTracker {
  fn check(&self) -> Result<()> {
    if let Some(until) = self.locked_until {
      if Instant::now() < until {
        return Err(VaultError::Locked);
      }
    }
    Ok(())
  }

  fn record_failure(&mut self) {
    self.failed_count += 1;
    if self.failed_count >= MAX_FAILED_ATTEMPTS {
      self.locked_until = Some(Instant::now() + LOCKOUT_DURATION);
    }
  }

  fn record_success(&mut self) {
    self.failed_count = 0;
    self.locked_until = None;
  }
}

/// In-memory state while [`VaultService`] is unlocked.
struct UnlockedState {
  /// KEK for v1 vaults, DEK for v2 — whichever key the current blob's
  /// ciphertext is actually encrypted under.
  data_key: Zeroizing<[u8; 32]>,
  /// Everything about the on-disk header except `data_nonce` and
  /// `ciphertext`, which are regenerated on every save.
  cached_metadata: VaultMetadata,
  records: HashMap<String, CredentialRecord>,
  metadata_sidecar: Option<VaultMetadataSidecar>,
  last_unlocked_at: DateTime<Utc>,
}

enum State {
  Sealed,
  Unlocked(UnlockedState),
  Tombstoned,
}

/// Owns a single vault file's lifecycle: opening, authenticating,
/// mutating its credential set, and re-sealing it.
pub struct VaultService {
  path: PathBuf,
  state: State,
  attempts: FailedAttemptTracker,
}

/// Derives the KEK/DEK from `file` and `password`, verifying authenticity
/// by successfully decrypting the stored blob. Used by both `unlock` and
/// `change_password`'s old-password check, so the two can never disagree
/// about what "correct password" means.
fn authenticate(file: &VaultFile, password: &str) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<Vec<u8>>)> {
  let mut salt = [0u8; 32];
  salt.copy_from_slice(&file.metadata.salt);
  let kek = crypto::kdf(password, &salt, file.metadata.kdf_cost)?;

  let data_key = match file.metadata.version {
    1 => Zeroizing::new(*kek),
    2 => {
      let wrapped = file.metadata.wrapped_dek.as_ref().expect("validated by VaultFile::validate_layout");
      let wrapped_nonce_bytes = file.metadata.wrapped_dek_nonce.as_ref().expect("validated by VaultFile::validate_layout");
      let mut nonce = [0u8; 12];
      nonce.copy_from_slice(wrapped_nonce_bytes);
      let dek_bytes = crypto::decrypt(&kek, &nonce, wrapped)?;
      if dek_bytes.len() != 32 {
        return Err(VaultError::CorruptVault("unwrapped DEK has unexpected length".into()));
      }
      let mut dek = [0u8; 32];
      dek.copy_from_slice(&dek_bytes);
      Zeroizing::new(dek)
    }
    other => return Err(VaultError::UnsupportedVersion(other)),
  };

  let mut data_nonce = [0u8; 12];
  data_nonce.copy_from_slice(&file.metadata.data_nonce);
  let plaintext = crypto::decrypt(&data_key, &data_nonce, &file.ciphertext)?;

  Ok((data_key, plaintext))
}

fn parse_records(plaintext: &[u8]) -> Result<HashMap<String, CredentialRecord>> {
  let records: Vec<CredentialRecord> = serde_json::from_slice(plaintext).map_err(|e| VaultError::CorruptVault(e.to_string()))?;
  Ok(records.into_iter().map(|r| (CredentialRecord::normalize_service(&r.service), r)).collect())
}

impl VaultService {
  /// Opens a handle to the vault at `path` without touching disk. The
  /// service starts `Sealed`; call [`Self::unlock`] before any credential
  /// operation.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      state: State::Sealed,
      attempts: FailedAttemptTracker::default(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// `true` if a vault file already exists at `path`.
  pub fn is_initialized(path: &Path) -> bool {
    path.exists()
  }

  /// Reads just the version byte of the vault at `path`, without deriving
  /// any key material.
  pub fn version(path: &Path) -> Result<u8> {
    Ok(storage::load(path)?.metadata.version)
  }

  /// Creates a new, empty vault at `path`.
  ///
  /// `wrap_with_dek = true` produces a v2 layout (a random DEK wrapped
  /// under the password-derived KEK); `false` produces the legacy v1
  /// layout where the KEK directly encrypts the blob. When `keychain` is
  /// supplied and `wrap_with_dek` is true, the password is also stashed
  /// there for non-interactive unlock. Returns a `Sealed` handle — call
  /// [`Self::unlock`] to start using it.
  pub fn initialize(path: &Path, password: &str, wrap_with_dek: bool, keychain: Option<KeychainTarget>) -> Result<Self> {
    tracing::debug!(path = %path.display(), wrap_with_dek, "vault initialize requested");
    if path.exists() {
      return Err(VaultError::AlreadyExists(path.to_path_buf()));
    }

    let cost = KdfCost::interactive();
    let salt = crypto::random_bytes::<32>();
    let kek = crypto::kdf(password, &salt, cost)?;

    let empty: Vec<CredentialRecord> = Vec::new();
    let plaintext = serde_json::to_vec(&empty).map_err(|e| VaultError::CorruptVault(e.to_string()))?;

    let (version, data_key, wrapped_dek, wrapped_dek_nonce) = if wrap_with_dek {
      let dek = crypto::random_bytes::<32>();
      let wrap_nonce = crypto::random_bytes::<12>();
      let wrapped = crypto::encrypt(&kek, &wrap_nonce, &dek)?;
      (2u8, Zeroizing::new(dek), Some(wrapped), Some(wrap_nonce.to_vec()))
    } else {
      (1u8, Zeroizing::new(*kek), None, None)
    };

    let data_nonce = crypto::random_bytes::<12>();
    let ciphertext = crypto::encrypt(&data_key, &data_nonce, &plaintext)?;

    let file = VaultFile {
      metadata: VaultMetadata {
        version,
        salt: salt.to_vec(),
        kdf_cost: cost,
        data_nonce: data_nonce.to_vec(),
        wrapped_dek,
        wrapped_dek_nonce,
      },
      ciphertext,
    };
    storage::save(path, &file)?;

    if wrap_with_dek {
      if let Some(target) = keychain {
        target.store.store(target.service, target.account, password)?;
      }
    }

    Ok(Self::new(path.to_path_buf()))
  }

  /// Creates a new v2 vault with mnemonic recovery configured, returning
  /// the handle plus the 24-word recovery phrase. The phrase is returned
  /// exactly once and is never persisted in plaintext anywhere.
  pub fn initialize_with_recovery(path: &Path, password: &str, passphrase: Option<&str>, keychain: Option<KeychainTarget>) -> Result<(Self, String)> {
    tracing::debug!(path = %path.display(), passphrase_required = passphrase.is_some(), "vault initialize_with_recovery requested");
    if path.exists() {
      return Err(VaultError::AlreadyExists(path.to_path_buf()));
    }

    let cost = KdfCost::interactive();
    let salt = crypto::random_bytes::<32>();
    let kek = crypto::kdf(password, &salt, cost)?;

    let dek = crypto::random_bytes::<32>();
    let wrap_nonce = crypto::random_bytes::<12>();
    let wrapped_dek = crypto::encrypt(&kek, &wrap_nonce, &dek)?;

    let empty: Vec<CredentialRecord> = Vec::new();
    let plaintext = serde_json::to_vec(&empty).map_err(|e| VaultError::CorruptVault(e.to_string()))?;
    let data_nonce = crypto::random_bytes::<12>();
    let ciphertext = crypto::encrypt(&dek, &data_nonce, &plaintext)?;

    let file = VaultFile {
      metadata: VaultMetadata {
        version: 2,
        salt: salt.to_vec(),
        kdf_cost: cost,
        data_nonce: data_nonce.to_vec(),
        wrapped_dek: Some(wrapped_dek),
        wrapped_dek_nonce: Some(wrap_nonce.to_vec()),
      },
      ciphertext,
    };
    storage::save(path, &file)?;

    let setup = recovery::build_recovery_config(password, &dek, passphrase, cost)?;
    metadata::save_metadata(path, &VaultMetadataSidecar { recovery: setup.config })?;

    if let Some(target) = keychain {
      target.store.store(target.service, target.account, password)?;
    }

    Ok((Self::new(path.to_path_buf()), setup.mnemonic_phrase))
  }

  fn require_unlocked(&mut self) -> Result<&mut UnlockedState> {
    match &mut self.state {
      State::Unlocked(s) => Ok(s),
      State::Sealed => Err(VaultError::Locked),
      State::Tombstoned => Err(VaultError::CorruptVault("vault is tombstoned".into())),
    }
  }

  fn require_unlocked_ref(&self) -> Result<&UnlockedState> {
    match &self.state {
      State::Unlocked(s) => Ok(s),
      State::Sealed => Err(VaultError::Locked),
      State::Tombstoned => Err(VaultError::CorruptVault("vault is tombstoned".into())),
    }
  }

  /// Authenticates `password` against the vault on disk and, on success,
  /// transitions `Sealed -> Unlocked`, decrypting every record into
  /// memory. Wrong-password attempts count toward a cooldown; once
  /// [`MAX_FAILED_ATTEMPTS`] is reached, further attempts are rejected
  /// with [`VaultError::Locked`] until the cooldown elapses, independent
  /// of whether the password supplied during the cooldown is correct.
  pub fn unlock(&mut self, password: &str) -> Result<()> {
    tracing::debug!(path = %self.path.display(), "vault unlock requested");
    self.attempts.check()?;

    let file = storage::load(&self.path)?;
    let result = authenticate(&file, password);
    let (data_key, plaintext) = match result {
      Ok(pair) => pair,
      Err(e) => {
        self.attempts.record_failure();
        tracing::warn!(path = %self.path.display(), kind = %e, "vault unlock failed");
        return Err(e);
      }
    };
    self.attempts.record_success();

    let records = parse_records(&plaintext)?;
    let metadata_sidecar = metadata::load_metadata(&self.path, false)?;

    self.state = State::Unlocked(UnlockedState {
      data_key,
      cached_metadata: file.metadata,
      records,
      metadata_sidecar,
      last_unlocked_at: Utc::now(),
    });
    Ok(())
  }

  /// Zeroizes every decrypted record and the data key, and transitions
  /// back to `Sealed`. A no-op if already sealed.
  pub fn lock(&mut self) {
    tracing::debug!(path = %self.path.display(), "vault locked");
    self.state = State::Sealed;
  }

  fn save_blob(&mut self) -> Result<()> {
    let path = self.path.clone();
    let file = {
      let state = self.require_unlocked()?;
      let mut records: Vec<&CredentialRecord> = state.records.values().collect();
      records.sort_by(|a, b| a.service.cmp(&b.service));
      let plaintext = Zeroizing::new(serde_json::to_vec(&records).map_err(|e| VaultError::CorruptVault(e.to_string()))?);

      let nonce = crypto::random_bytes::<12>();
      let ciphertext = crypto::encrypt(&state.data_key, &nonce, &plaintext)?;
      state.cached_metadata.data_nonce = nonce.to_vec();

      VaultFile {
        metadata: state.cached_metadata.clone(),
        ciphertext,
      }
    };
    storage::save(&path, &file)
  }

  /// Adds `record`. Fails with [`VaultError::DuplicateService`] if a
  /// record with the same normalized service name already exists.
  pub fn add(&mut self, record: CredentialRecord) -> Result<()> {
    let key = CredentialRecord::normalize_service(&record.service);
    {
      let state = self.require_unlocked()?;
      if state.records.contains_key(&key) {
        return Err(VaultError::DuplicateService(record.service));
      }
      state.records.insert(key, record);
    }
    self.save_blob()
  }

  /// Returns a clone of the record for `service`, touching its
  /// `last_accessed` timestamp and persisting that touch.
  pub fn get(&mut self, service: &str) -> Result<CredentialRecord> {
    let key = CredentialRecord::normalize_service(service);
    let clone = {
      let state = self.require_unlocked()?;
      let record = state.records.get_mut(&key).ok_or_else(|| VaultError::CredentialNotFound(service.to_string()))?;
      record.touch_accessed();
      record.clone()
    };
    self.save_blob()?;
    Ok(clone)
  }

  /// Replaces the record for `service` with `updated`, bumping
  /// `updated_at`. `updated.service` must normalize to the same key as
  /// `service` — renaming a service is a delete + add.
  pub fn update(&mut self, service: &str, mut updated: CredentialRecord) -> Result<()> {
    let key = CredentialRecord::normalize_service(service);
    {
      let state = self.require_unlocked()?;
      if !state.records.contains_key(&key) {
        return Err(VaultError::CredentialNotFound(service.to_string()));
      }
      if CredentialRecord::normalize_service(&updated.service) != key {
        return Err(VaultError::InvalidArgument("update cannot change the service key; delete and add instead".into()));
      }
      updated.touch_updated();
      state.records.insert(key, updated);
    }
    self.save_blob()
  }

  /// Removes the record for `service`.
  pub fn delete(&mut self, service: &str) -> Result<()> {
    let key = CredentialRecord::normalize_service(service);
    {
      let state = self.require_unlocked()?;
      if state.records.remove(&key).is_none() {
        return Err(VaultError::CredentialNotFound(service.to_string()));
      }
    }
    self.save_blob()
  }

  /// Lists every record, sorted by service name. Read-only; does not
  /// touch `last_accessed` or persist anything.
  pub fn list(&self) -> Result<Vec<CredentialRecord>> {
    let state = self.require_unlocked_ref()?;
    let mut records: Vec<CredentialRecord> = state.records.values().cloned().collect();
    records.sort_by(|a, b| a.service.cmp(&b.service));
    Ok(records)
  }

  pub fn last_unlocked_at(&self) -> Result<DateTime<Utc>> {
    Ok(self.require_unlocked_ref()?.last_unlocked_at)
  }

  /// Re-authenticates `old_password` against the file on disk, then
  /// rewraps everything under `new_password`: for v1 vaults, a fresh
  /// salt and a full re-encrypt of the blob under the new KEK directly;
  /// for v2 vaults, a fresh salt and a fresh wrap of the *same* DEK (the
  /// blob's plaintext is untouched, though `save_blob` always regenerates
  /// the nonce). If recovery is configured, its challenge material is
  /// re-encrypted under the new password too.
  ///
  /// If the vault file writes successfully but the metadata sidecar
  /// write fails, a best-effort rollback restores the original vault
  /// bytes; if that rollback also fails, returns
  /// [`VaultError::PartialPasswordChange`] rather than leaving the
  /// caller to guess which half of the change applied.
  pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
    tracing::debug!(path = %self.path.display(), "change_password requested");
    self.require_unlocked()?;

    let original_bytes = std::fs::read(&self.path)?;
    let file = storage::load(&self.path)?;
    if let Err(e) = authenticate(&file, old_password) {
      tracing::warn!(path = %self.path.display(), kind = %e, "change_password rejected: old password did not authenticate");
      return Err(e);
    }

    let new_salt = crypto::random_bytes::<32>();
    let cost = file.metadata.kdf_cost;
    let kek_new = crypto::kdf(new_password, &new_salt, cost)?;

    let has_recovery;
    {
      let state = self.require_unlocked()?;

      match state.cached_metadata.version {
        1 => {
          state.data_key = Zeroizing::new(*kek_new);
          state.cached_metadata.salt = new_salt.to_vec();
          state.cached_metadata.wrapped_dek = None;
          state.cached_metadata.wrapped_dek_nonce = None;
        }
        2 => {
          let wrap_nonce = crypto::random_bytes::<12>();
          let wrapped = crypto::encrypt(&kek_new, &wrap_nonce, &state.data_key)?;
          state.cached_metadata.salt = new_salt.to_vec();
          state.cached_metadata.wrapped_dek = Some(wrapped);
          state.cached_metadata.wrapped_dek_nonce = Some(wrap_nonce.to_vec());
        }
        other => return Err(VaultError::UnsupportedVersion(other)),
      }

      has_recovery = state.metadata_sidecar.is_some();
    }

    self.save_blob()?;

    if !has_recovery {
      return Ok(());
    }

    let sidecar_result = self.rewrap_recovery_challenge(old_password, new_password, cost);
    if let Err(e) = sidecar_result {
      tracing::warn!(path = %self.path.display(), kind = %e, "recovery sidecar rewrap failed after vault rewrite, attempting rollback");
      return match storage::atomic_write(&self.path, &original_bytes) {
        Ok(()) => Err(e),
        Err(rollback_err) => {
          tracing::warn!(path = %self.path.display(), kind = %rollback_err, "rollback also failed, vault and recovery metadata may disagree");
          Err(VaultError::PartialPasswordChange)
        }
      };
    }
    Ok(())
  }

  fn rewrap_recovery_challenge(&mut self, old_password: &str, new_password: &str, cost: KdfCost) -> Result<()> {
    let mut sidecar = metadata::load_metadata(&self.path, true)?.expect("checked present by caller");

    let mut old_salt_challenge = [0u8; 32];
    old_salt_challenge.copy_from_slice(&sidecar.recovery.kdf.salt_challenge);
    let old_challenge_key = crypto::kdf(old_password, &old_salt_challenge, sidecar.recovery.kdf.cost())?;
    let mut nonce_stored = [0u8; 12];
    nonce_stored.copy_from_slice(&sidecar.recovery.nonce_stored);
    let stored_words_canonical = crypto::decrypt(&old_challenge_key, &nonce_stored, &sidecar.recovery.encrypted_stored_words)?;

    let new_salt_challenge = crypto::random_bytes::<32>();
    let new_challenge_key = crypto::kdf(new_password, &new_salt_challenge, cost)?;
    let new_nonce_stored = crypto::random_bytes::<12>();
    let encrypted_stored_words_new = crypto::encrypt(&new_challenge_key, &new_nonce_stored, &stored_words_canonical)?;

    sidecar.recovery.kdf.salt_challenge = new_salt_challenge.to_vec();
    sidecar.recovery.encrypted_stored_words = encrypted_stored_words_new;
    sidecar.recovery.nonce_stored = new_nonce_stored.to_vec();
    metadata::save_metadata(&self.path, &sidecar)
  }

  /// One-way upgrade of a v1 vault to v2: unlock as v1, mint a fresh DEK,
  /// wrap it under the existing KEK (same password, same salt), and
  /// re-encrypt the blob under the DEK. There is no downgrade path.
  pub fn migrate_v1_to_v2(&mut self) -> Result<()> {
    tracing::debug!(path = %self.path.display(), "migrate_v1_to_v2 requested");
    let state = self.require_unlocked()?;
    if state.cached_metadata.version != 1 {
      return Err(VaultError::InvalidArgument("migrate_v1_to_v2 requires a v1 vault".into()));
    }

    let kek = state.data_key.clone();
    let dek = crypto::random_bytes::<32>();
    let wrap_nonce = crypto::random_bytes::<12>();
    let wrapped = crypto::encrypt(&kek, &wrap_nonce, &dek)?;

    state.cached_metadata.version = 2;
    state.cached_metadata.wrapped_dek = Some(wrapped);
    state.cached_metadata.wrapped_dek_nonce = Some(wrap_nonce.to_vec());
    state.data_key = Zeroizing::new(dek);

    self.save_blob()
  }
}
