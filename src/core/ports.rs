//! Port and port-set types
//!
//! A [`Port`] can only be constructed for values in `1..=65535`, so every
//! operation that takes one has already passed validation. [`PortSet`] is the
//! ordered, deduplicated collection presented to API callers.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A validated TCP/UDP port in `1..=65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    /// Validates a raw integer.
    pub fn new(value: i64) -> Result<Self> {
        u16::try_from(value)
            .ok()
            .filter(|p| *p != 0)
            .map(Self)
            .ok_or_else(|| Error::validation("port", "Port must be an integer between 1 and 65535"))
    }

    /// Extracts a port from a JSON request value.
    ///
    /// Accepts integers, integral floats (`80.0`) and numeric strings (`"80"`).
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Self::new(i);
                }
                match n.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(f) if f.fract() == 0.0 && f.abs() < 1e9 => Self::new(f as i64),
                    _ => Err(Error::validation("port", "Port must be an integer")),
                }
            }
            Value::String(s) => s.parse(),
            _ => Err(Error::validation("port", "Port is required")),
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| Error::validation("port", format!("'{trimmed}' is not an integer")))?;
        Self::new(value)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Port {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u16::deserialize(deserializer)?;
        Port::new(i64::from(raw)).map_err(serde::de::Error::custom)
    }
}

/// Ordered set of ports, serialized ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PortSet(BTreeSet<Port>);

impl PortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ascending raw values.
    pub fn to_vec(&self) -> Vec<u16> {
        self.0.iter().map(|p| p.get()).collect()
    }
}

/// Collects raw values, silently dropping 0.
impl FromIterator<u16> for PortSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|p| *p != 0).map(Port).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_port_bounds() {
        assert!(Port::new(0).is_err());
        assert!(Port::new(-1).is_err());
        assert!(Port::new(65536).is_err());
        assert_eq!(Port::new(1).unwrap().get(), 1);
        assert_eq!(Port::new(65535).unwrap().get(), 65535);
    }

    #[test]
    fn test_port_from_json_variants() {
        assert_eq!(Port::from_json(&json!(8080)).unwrap().get(), 8080);
        assert_eq!(Port::from_json(&json!("443")).unwrap().get(), 443);
        assert_eq!(Port::from_json(&json!(22.0)).unwrap().get(), 22);
        assert!(Port::from_json(&json!(22.5)).is_err());
        assert!(Port::from_json(&json!("abc")).is_err());
        assert!(Port::from_json(&json!(null)).is_err());
        assert!(Port::from_json(&json!([80])).is_err());
    }

    #[test]
    fn test_port_error_is_validation() {
        let err = Port::from_json(&json!(70000)).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "port"));
    }

    #[test]
    fn test_port_set_sorted_and_deduplicated() {
        let set: PortSet = [443u16, 22, 80, 22, 0].into_iter().collect();
        assert_eq!(set.to_vec(), vec![22, 80, 443]);
        assert_eq!(serde_json::to_string(&set).unwrap(), "[22,80,443]");
    }

    #[test]
    fn test_port_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Port>("0").is_err());
        assert_eq!(serde_json::from_str::<Port>("53").unwrap().get(), 53);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_port_new_accepts_exactly_valid_range(value in -100_000i64..100_000) {
            let result = Port::new(value);
            if (1..=65535).contains(&value) {
                prop_assert_eq!(i64::from(result.unwrap().get()), value);
            } else {
                prop_assert!(result.is_err());
            }
        }

        #[test]
        fn test_port_from_str_roundtrips_display(port in 1u16..=65535) {
            let parsed: Port = port.to_string().parse().unwrap();
            prop_assert_eq!(parsed.to_string(), port.to_string());
        }

        #[test]
        fn test_port_set_is_always_ascending(
            values in proptest::collection::vec(any::<u16>(), 0..64)
        ) {
            let set: PortSet = values.into_iter().collect();
            let raw = set.to_vec();
            prop_assert!(raw.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(!raw.contains(&0));
        }
    }
}
