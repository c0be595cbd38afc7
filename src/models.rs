//! Core data structures shared across the engine.
//!
//! [`CredentialRecord`] is the only structural invariant the blob enforces:
//! service-name uniqueness (case-insensitive). Everything else about a
//! record is opaque to the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

/// A single credential stored in the encrypted blob.
///
/// `id` is a stable identity independent of `service`, so a rename (which
/// `VaultService::update` refuses to do in place — see its doc comment) can
/// still be recognized as "the same credential" by a caller that tracks
/// entries by id. The spec's structural invariant is service-name
/// uniqueness only; `id` is additive and never consulted by the engine
/// itself. The `secret` field is zeroized when the record is dropped,
/// matching the engine-wide rule that decrypted records are zeroized on
/// lock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialRecord {
  pub id: String,
  pub service: String,
  pub username: String,
  pub secret: String,
  pub notes: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub last_accessed: Option<DateTime<Utc>>,
}

impl CredentialRecord {
  pub fn new(service: String, username: String, secret: String, notes: String) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4().to_string(),
      service,
      username,
      secret,
      notes,
      created_at: now,
      updated_at: now,
      last_accessed: None,
    }
  }

  pub fn touch_updated(&mut self) {
    self.updated_at = Utc::now();
  }

  pub fn touch_accessed(&mut self) {
    self.last_accessed = Some(Utc::now());
  }

  /// Case-insensitive normalization of a service name, used as the map key
  /// and for duplicate detection.
  pub fn normalize_service(service: &str) -> String {
    service.to_lowercase()
  }
}

impl Zeroize for CredentialRecord {
  fn zeroize(&mut self) {
    self.id.zeroize();
    self.service.zeroize();
    self.username.zeroize();
    self.secret.zeroize();
    self.notes.zeroize();
  }
}

impl Drop for CredentialRecord {
  fn drop(&mut self) {
    self.zeroize();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_service_is_case_insensitive() {
    assert_eq!(CredentialRecord::normalize_service("GitHub.com"), "github.com");
    assert_eq!(
      CredentialRecord::normalize_service("github.com"),
      CredentialRecord::normalize_service("GITHUB.COM")
    );
  }
}
