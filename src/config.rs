//! Vault path resolution collaborator seam.
//!
//! Where the vault file lives is a shell concern (CLI flag, config file,
//! platform data directory convention) the engine is deliberately blind
//! to. This module only defines the trait boundary plus a simple
//! fixed-directory implementation grounded in the teacher's own
//! `resolve_vault_path` (app data dir joined with a fixed filename,
//! creating the directory if it doesn't exist yet).

use std::io;
use std::path::PathBuf;

/// Fixed vault filename joined onto a caller-supplied app directory,
/// matching the teacher's `VAULT_FILENAME` constant.
const VAULT_FILENAME: &str = "vault.json";

/// Resolves the path a [`crate::vault::VaultService`] should open.
pub trait ConfigProvider {
  fn vault_path(&self) -> PathBuf;
}

/// Resolves to `<app_dir>/vault.json`. `new` creates `app_dir` if it
/// doesn't already exist, the same way the teacher's `resolve_vault_path`
/// calls `fs::create_dir_all` before ever returning a path.
pub struct FileConfigProvider {
  app_dir: PathBuf,
}

impl FileConfigProvider {
  pub fn new(app_dir: impl Into<PathBuf>) -> io::Result<Self> {
    let app_dir = app_dir.into();
    std::fs::create_dir_all(&app_dir)?;
    Ok(Self { app_dir })
  }
}

impl ConfigProvider for FileConfigProvider {
  fn vault_path(&self) -> PathBuf {
    self.app_dir.join(VAULT_FILENAME)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn joins_app_dir_and_fixed_filename() {
    let dir = tempfile::tempdir().unwrap();
    let app_dir = dir.path().join("pass-vault");
    let provider = FileConfigProvider::new(&app_dir).unwrap();
    assert_eq!(provider.vault_path(), app_dir.join("vault.json"));
  }

  #[test]
  fn creates_app_dir_if_absent() {
    let dir = tempfile::tempdir().unwrap();
    let app_dir = dir.path().join("does-not-exist-yet");
    assert!(!app_dir.exists());
    FileConfigProvider::new(&app_dir).unwrap();
    assert!(app_dir.exists());
  }
}
