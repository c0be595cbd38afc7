//! Cryptographic primitives.
//!
//! - **KDF**: Argon2id (RFC 9106), per-call cost parameters.
//! - **Cipher**: AES-256-GCM (authenticated encryption, 12-byte nonce,
//!   16-byte tag).
//! - **Randomness**: OS CSPRNG via `rand::rngs::OsRng`.
//! - **Mnemonic**: BIP39 English wordlist, 24 words = 256 bits of entropy.
//!
//! This module performs no I/O and holds no state across calls. Every
//! byte buffer that carries secret material is wrapped in `Zeroizing` or
//! explicitly zeroized before being dropped.

use crate::error::{Result, VaultError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Length in bytes of a KDF salt.
pub const SALT_LEN: usize = 32;
/// Length in bytes of an AES-GCM nonce.
pub const NONCE_LEN: usize = 12;
/// Length in bytes of a derived key or DEK.
pub const KEY_LEN: usize = 32;
/// Number of words in the recovery mnemonic.
pub const MNEMONIC_WORD_COUNT: usize = 24;

/// Argon2id cost parameters. Stored alongside the vault so unlock always
/// re-derives with the exact parameters used at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KdfCost {
  /// Memory cost in KiB.
  pub memory_kib: u32,
  /// Number of iterations.
  pub iterations: u32,
  /// Degree of parallelism.
  pub parallelism: u32,
}

impl KdfCost {
  /// Interactive-use defaults: 64 MiB, 3 iterations, 1 lane. Roughly
  /// 100-500ms on typical hardware, per the crypto primitives contract.
  pub fn interactive() -> Self {
    Self {
      memory_kib: 64 * 1024,
      iterations: 3,
      parallelism: 1,
    }
  }

  /// Lighter parameters for tests, where Argon2id's real cost would make
  /// the suite too slow without changing the code paths under test.
  #[cfg(test)]
  pub fn for_tests() -> Self {
    Self {
      memory_kib: 8 * 1024,
      iterations: 1,
      parallelism: 1,
    }
  }
}

/// Derives a 256-bit key from `password` and `salt` using Argon2id.
///
/// Fails only if `cost` describes invalid Argon2 parameters.
pub fn kdf(password: &str, salt: &[u8; SALT_LEN], cost: KdfCost) -> Result<Zeroizing<[u8; KEY_LEN]>> {
  let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, Some(KEY_LEN))
    .map_err(|e| VaultError::InvalidArgument(format!("argon2 params: {e}")))?;
  let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

  let mut key = Zeroizing::new([0u8; KEY_LEN]);
  argon2
    .hash_password_into(password.as_bytes(), salt, key.as_mut())
    .map_err(|e| VaultError::InvalidArgument(format!("argon2: {e}")))?;

  Ok(key)
}

/// Encrypts `plaintext` under `key` with `nonce`, returning ciphertext with
/// the 16-byte GCM tag appended.
pub fn encrypt(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
  let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
  cipher
    .encrypt(Nonce::from_slice(nonce), plaintext)
    .map_err(|_| VaultError::BadPassword)
}

/// Decrypts `ciphertext` (with trailing tag) under `key` with `nonce`.
///
/// Authentication failure is indistinguishable from a wrong key: both
/// surface as [`VaultError::BadPassword`]. Callers that need a different
/// error variant (e.g. recovery) should map this themselves.
pub fn decrypt(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
  let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
  cipher
    .decrypt(Nonce::from_slice(nonce), ciphertext)
    .map(Zeroizing::new)
    .map_err(|_| VaultError::BadPassword)
}

/// Fills an array of length `N` with CSPRNG output.
pub fn random_bytes<const N: usize>() -> [u8; N] {
  let mut buf = [0u8; N];
  OsRng.fill_bytes(&mut buf);
  buf
}

/// Draws `count` distinct values uniformly from `0..bound` without
/// replacement, returned in the order drawn (Fisher-Yates partial shuffle).
///
/// This order is load-bearing: it is the order challenge positions are
/// requested from the user on recovery.
pub fn random_distinct_indices(bound: usize, count: usize) -> Vec<usize> {
  let mut pool: Vec<usize> = (0..bound).collect();
  let mut drawn = Vec::with_capacity(count);
  for _ in 0..count {
    let remaining = pool.len();
    let idx = (OsRng.next_u32() as usize) % remaining;
    drawn.push(pool.swap_remove(idx));
  }
  drawn
}

/// Constant-time equality for equal-length byte slices. Unequal lengths
/// are public metadata (not a secret), so they short-circuit to `false`
/// without leaking timing about the compared *contents*.
pub fn const_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  a.ct_eq(b).into()
}

/// A freshly generated 24-word BIP39 mnemonic (256 bits of entropy).
pub struct GeneratedMnemonic {
  pub mnemonic: Mnemonic,
}

/// Generates a new 24-word English mnemonic from CSPRNG entropy.
pub fn mnemonic_generate() -> Result<GeneratedMnemonic> {
  let mut entropy = Zeroizing::new([0u8; 32]);
  OsRng.fill_bytes(entropy.as_mut());
  let mnemonic = Mnemonic::from_entropy(entropy.as_ref())
    .map_err(|e| VaultError::InvalidArgument(format!("mnemonic generation: {e}")))?;
  Ok(GeneratedMnemonic { mnemonic })
}

/// Parses a 24-word mnemonic phrase, validating its BIP39 checksum.
///
/// Returns [`VaultError::InvalidMnemonic`] on a malformed word list or a
/// failed checksum. The failing word index is reported when it can be
/// pinpointed (an out-of-wordlist word); checksum failures point at no
/// specific word.
pub fn mnemonic_parse(phrase: &str) -> Result<Mnemonic> {
  let words: Vec<&str> = phrase.split_whitespace().collect();
  if words.len() != MNEMONIC_WORD_COUNT {
    return Err(VaultError::InvalidMnemonic(None));
  }

  let wordlist = bip39::Language::English.word_list();
  for (i, w) in words.iter().enumerate() {
    if !wordlist.contains(&w.to_ascii_lowercase().as_str()) {
      return Err(VaultError::InvalidMnemonic(Some(i)));
    }
  }

  Mnemonic::parse_in_normalized(bip39::Language::English, phrase).map_err(|_| VaultError::InvalidMnemonic(None))
}

/// Canonical ASCII lowercase form of a mnemonic word.
pub fn canonical_word(word: &str) -> String {
  word.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kdf_is_deterministic() {
    let salt = [7u8; SALT_LEN];
    let a = kdf("correct horse battery staple", &salt, KdfCost::for_tests()).unwrap();
    let b = kdf("correct horse battery staple", &salt, KdfCost::for_tests()).unwrap();
    assert_eq!(*a, *b);
  }

  #[test]
  fn kdf_differs_by_password() {
    let salt = [7u8; SALT_LEN];
    let a = kdf("password-one", &salt, KdfCost::for_tests()).unwrap();
    let b = kdf("password-two", &salt, KdfCost::for_tests()).unwrap();
    assert_ne!(*a, *b);
  }

  #[test]
  fn encrypt_decrypt_roundtrip() {
    let key = random_bytes::<KEY_LEN>();
    let nonce = random_bytes::<NONCE_LEN>();
    let plaintext = b"hello vault";
    let ciphertext = encrypt(&key, &nonce, plaintext).unwrap();
    let decrypted = decrypt(&key, &nonce, &ciphertext).unwrap();
    assert_eq!(&*decrypted, plaintext);
  }

  #[test]
  fn decrypt_wrong_key_fails() {
    let key = random_bytes::<KEY_LEN>();
    let other_key = random_bytes::<KEY_LEN>();
    let nonce = random_bytes::<NONCE_LEN>();
    let ciphertext = encrypt(&key, &nonce, b"payload").unwrap();
    assert!(matches!(decrypt(&other_key, &nonce, &ciphertext), Err(VaultError::BadPassword)));
  }

  #[test]
  fn random_distinct_indices_are_distinct_and_in_range() {
    let drawn = random_distinct_indices(24, 6);
    assert_eq!(drawn.len(), 6);
    let mut sorted = drawn.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 6);
    assert!(drawn.iter().all(|&i| i < 24));
  }

  #[test]
  fn const_eq_matches_equal_and_rejects_unequal_length() {
    assert!(const_eq(b"abc", b"abc"));
    assert!(!const_eq(b"abc", b"abd"));
    assert!(!const_eq(b"abc", b"ab"));
  }

  #[test]
  fn mnemonic_roundtrip() {
    let generated = mnemonic_generate().unwrap();
    let phrase = generated.mnemonic.to_string();
    let words: Vec<&str> = phrase.split_whitespace().collect();
    assert_eq!(words.len(), MNEMONIC_WORD_COUNT);

    let parsed = mnemonic_parse(&phrase).unwrap();
    assert_eq!(parsed.to_string(), phrase);
  }

  #[test]
  fn mnemonic_parse_rejects_bad_checksum() {
    // 24 valid words but not a valid checksum combination.
    let bad = "abandon ".repeat(23) + "zoo";
    assert!(mnemonic_parse(&bad).is_err());
  }

  #[test]
  fn mnemonic_parse_rejects_unknown_word() {
    let mut words = vec!["abandon"; 23];
    words.push("notarealbip39word");
    let phrase = words.join(" ");
    assert!(matches!(mnemonic_parse(&phrase), Err(VaultError::InvalidMnemonic(Some(23)))));
  }
}
