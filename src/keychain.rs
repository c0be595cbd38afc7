//! OS keychain collaborator seam.
//!
//! The engine never talks to a platform keychain directly — that belongs
//! to the CLI/GUI shell. This module only defines the trait boundary a
//! shell plugs into for non-interactive unlock (store the password once,
//! retrieve it on later launches instead of prompting), plus an in-memory
//! double for tests.

use crate::error::Result;

/// A place to stash a vault's master password outside the vault file
/// itself, so a shell can offer non-interactive unlock.
///
/// Implementations are expected to hand their bytes to a real OS facility
/// (macOS Keychain, Secret Service, Windows Credential Manager); this
/// crate ships only [`InMemoryKeychain`] for tests.
pub trait KeychainStore {
  fn store(&self, service: &str, account: &str, password: &str) -> Result<()>;
  fn retrieve(&self, service: &str, account: &str) -> Result<Option<String>>;
  fn delete(&self, service: &str, account: &str) -> Result<()>;
  fn is_available(&self) -> bool;
}

/// Identifies where [`VaultService::initialize`] and
/// [`VaultService::initialize_with_recovery`] should stash the freshly-set
/// password, when the caller wants non-interactive unlock wired up from
/// the start.
pub struct KeychainTarget<'a> {
  pub store: &'a dyn KeychainStore,
  pub service: &'a str,
  pub account: &'a str,
}

/// Process-local, non-persistent [`KeychainStore`] for tests and for
/// shells without a platform keychain available.
#[derive(Default)]
pub struct InMemoryKeychain {
  entries: std::sync::Mutex<std::collections::HashMap<(String, String), String>>,
}

impl InMemoryKeychain {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeychainStore for InMemoryKeychain {
  fn store(&self, service: &str, account: &str, password: &str) -> Result<()> {
    self
      .entries
      .lock()
      .unwrap()
      .insert((service.to_string(), account.to_string()), password.to_string());
    Ok(())
  }

  fn retrieve(&self, service: &str, account: &str) -> Result<Option<String>> {
    Ok(self.entries.lock().unwrap().get(&(service.to_string(), account.to_string())).cloned())
  }

  fn delete(&self, service: &str, account: &str) -> Result<()> {
    self.entries.lock().unwrap().remove(&(service.to_string(), account.to_string()));
    Ok(())
  }

  fn is_available(&self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_then_retrieve_round_trips() {
    let kc = InMemoryKeychain::new();
    kc.store("pass-vault", "default", "hunter2").unwrap();
    assert_eq!(kc.retrieve("pass-vault", "default").unwrap(), Some("hunter2".to_string()));
  }

  #[test]
  fn retrieve_missing_entry_is_none() {
    let kc = InMemoryKeychain::new();
    assert_eq!(kc.retrieve("pass-vault", "nobody").unwrap(), None);
  }

  #[test]
  fn delete_removes_entry() {
    let kc = InMemoryKeychain::new();
    kc.store("pass-vault", "default", "hunter2").unwrap();
    kc.delete("pass-vault", "default").unwrap();
    assert_eq!(kc.retrieve("pass-vault", "default").unwrap(), None);
  }
}
