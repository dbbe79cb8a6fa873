/*!
 * Serde Helpers
 * Skip predicates, validating deserializers and timestamp encodings
 */

use serde::{Deserialize, Deserializer, Serializer};

pub use serde_with::{serde_as, skip_serializing_none};

/// Skip serializing if value is default
#[inline]
pub fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    value == &T::default()
}

/// Skip serializing if bool is false
#[inline]
pub const fn is_false(value: &bool) -> bool {
    !*value
}

#[inline]
pub const fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

/// Deserialize and validate a non-empty string
pub fn deserialize_nonempty_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Err(serde::de::Error::custom("string must not be empty"));
    }
    Ok(s)
}

/// SystemTime as microseconds since UNIX epoch
pub mod system_time_micros {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[inline]
    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(duration.as_micros() as u64)
    }

    #[inline]
    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_micros(micros))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Stamp {
        #[serde(with = "system_time_micros")]
        at: SystemTime,
        #[serde(skip_serializing_if = "is_false", default)]
        dirty: bool,
        #[serde(skip_serializing_if = "is_zero_u64", default)]
        size: u64,
    }

    #[test]
    fn test_skip_predicates_compact_output() {
        let stamp = Stamp {
            at: UNIX_EPOCH + Duration::from_micros(1_500),
            dirty: false,
            size: 0,
        };
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"at":1500}"#);
        let back: Stamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stamp);
    }

    #[test]
    fn test_nonempty_string_rejects_empty() {
        #[derive(Deserialize)]
        struct Named {
            #[serde(deserialize_with = "deserialize_nonempty_string")]
            #[allow(dead_code)]
            name: String,
        }
        assert!(serde_json::from_str::<Named>(r#"{"name":""}"#).is_err());
        assert!(serde_json::from_str::<Named>(r#"{"name":"init"}"#).is_ok());
    }
}
