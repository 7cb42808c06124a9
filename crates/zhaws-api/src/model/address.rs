// ── Network addresses ──
//
// Ieee and Nwk identify a node on the mesh. Every device, entity owner and
// group member refers to them, and both travel as strings on the wire.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} address '{input}'")]
pub struct AddressParseError {
    kind: &'static str,
    input: String,
}

// ── Ieee ────────────────────────────────────────────────────────────

/// 64-bit long-form device address.
///
/// Printed lowercase and colon-separated (`aa:bb:cc:dd:ee:ff:00:01`).
/// Parsing accepts upper case and `-` separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ieee([u8; 8]);

impl Ieee {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn octets(&self) -> [u8; 8] {
        self.0
    }
}

impl fmt::Display for Ieee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Ieee {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError {
            kind: "IEEE",
            input: s.to_owned(),
        };
        let mut bytes = [0u8; 8];
        let mut parts = s.split([':', '-']);
        for slot in &mut bytes {
            let part = parts.next().ok_or_else(err)?;
            if part.len() != 2 {
                return Err(err());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Ieee {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ieee {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IeeeVisitor;

        impl Visitor<'_> for IeeeVisitor {
            type Value = Ieee;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an IEEE address like \"aa:bb:cc:dd:ee:ff:00:01\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Ieee, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IeeeVisitor)
    }
}

// ── Nwk ─────────────────────────────────────────────────────────────

/// 16-bit short network address, printed as `0x1A2B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nwk(pub u16);

impl fmt::Display for Nwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl FromStr for Nwk {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u16::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| AddressParseError {
                kind: "NWK",
                input: s.to_owned(),
            })
    }
}

impl Serialize for Nwk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Nwk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NwkVisitor;

        impl Visitor<'_> for NwkVisitor {
            type Value = Nwk;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex string like \"0x1A2B\" or an integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Nwk, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Nwk, E> {
                u16::try_from(v).map(Nwk).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Nwk, E> {
                u16::try_from(v).map(Nwk).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(NwkVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ieee_normalizes_case_and_dashes() {
        let ieee: Ieee = "AA-BB-CC-DD-EE-FF-00-01".parse().unwrap();
        assert_eq!(ieee.to_string(), "aa:bb:cc:dd:ee:ff:00:01");
    }

    #[test]
    fn ieee_rejects_short_input() {
        assert!("aa:bb:cc".parse::<Ieee>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00:01:02".parse::<Ieee>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00:zz".parse::<Ieee>().is_err());
    }

    #[test]
    fn ieee_serializes_as_string_and_map_key() {
        let ieee: Ieee = "aa:bb:cc:dd:ee:ff:00:01".parse().unwrap();
        let mut map = std::collections::BTreeMap::new();
        map.insert(ieee, 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"aa:bb:cc:dd:ee:ff:00:01":1}"#);
        let back: std::collections::BTreeMap<Ieee, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn nwk_accepts_hex_string_and_integer() {
        let from_hex: Nwk = serde_json::from_str(r#""0x1A2B""#).unwrap();
        let from_int: Nwk = serde_json::from_str("6699").unwrap();
        assert_eq!(from_hex, Nwk(0x1A2B));
        assert_eq!(from_int, Nwk(0x1A2B));
        assert_eq!(serde_json::to_string(&from_hex).unwrap(), r#""0x1A2B""#);
    }
}
