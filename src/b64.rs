//! Serde helpers for base64-encoding raw byte fields in the vault's JSON
//! wire format (spec: "Byte fields are base64-encoded").

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
  STANDARD.encode(bytes).serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
  let s = String::deserialize(deserializer)?;
  STANDARD.decode(&s).map_err(serde::de::Error::custom)
}

pub mod option {
  use super::STANDARD;
  use base64::Engine;
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
      Some(b) => STANDARD.encode(b).serialize(serializer),
      None => unreachable!("use skip_serializing_if for omitted fields"),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
      Some(s) => STANDARD.decode(&s).map(Some).map_err(serde::de::Error::custom),
      None => Ok(None),
    }
  }
}
