//! Field-level serde codecs for the wire conventions.

use serde::{Deserialize, Deserializer, Serializer};

/// u64 as a decimal string on the wire.
///
/// Inodes come from the host filesystem and routinely exceed 2^53; sizes can
/// too. Use with `#[serde(with = "codec::u64_string")]`.
pub mod u64_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `Option<u64>` as an optional decimal string.
///
/// For optional body fields like `setattr.size`. A missing field is `None`;
/// `null` is also accepted.
pub mod opt_u64_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::u64_string")]
        v: u64,
    }

    #[test]
    fn test_u64_string_roundtrip() {
        let json = serde_json::to_string(&Holder { v: u64::MAX }).unwrap();
        assert_eq!(json, r#"{"v":"18446744073709551615"}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.v, u64::MAX);
    }

    #[test]
    fn test_u64_string_rejects_garbage() {
        let r: Result<Holder, _> = serde_json::from_str(r#"{"v":"12x"}"#);
        assert!(r.is_err());
    }
}
