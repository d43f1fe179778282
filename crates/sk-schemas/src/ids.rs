//! Wire-format newtypes for 64-bit domain IDs and monetary values.
//!
//! Every ID originating from the external domain (characters, corporations,
//! alliances, systems, ship types, killmails) is a `u64` that can exceed the
//! safe-integer range of some client runtimes. Both of these newtypes
//! serialize as JSON strings and deserialize from either a JSON string or a
//! JSON number, so the wire contract is strict on the way out and lenient on
//! the way in.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 64-bit domain identifier (character, corp, alliance, system, ship type,
/// killmail). Always serialized as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(pub u64);

impl DomainId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DomainId {
    fn from(v: u64) -> Self {
        DomainId(v)
    }
}

impl From<DomainId> for u64 {
    fn from(v: DomainId) -> Self {
        v.0
    }
}

impl Serialize for DomainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct U64StrVisitor;

impl<'de> Visitor<'de> for U64StrVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a u64 as a decimal string or JSON number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.parse::<u64>()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| de::Error::invalid_value(de::Unexpected::Signed(v), &self))
    }
}

impl<'de> Deserialize<'de> for DomainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(U64StrVisitor).map(DomainId)
    }
}

/// An ISK (monetary) value. Serializes as a decimal string when it exceeds
/// 2^53 (the JS safe-integer boundary), otherwise as a JSON number — matches
/// monetary values, where values that size are also carried as strings.
/// Deserialization
/// accepts either representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Isk(pub u64);

const JS_SAFE_INTEGER: u64 = 1 << 53;

impl Isk {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Isk {
    fn from(v: u64) -> Self {
        Isk(v)
    }
}

impl From<Isk> for u64 {
    fn from(v: Isk) -> Self {
        v.0
    }
}

impl Serialize for Isk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 >= JS_SAFE_INTEGER {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Isk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(U64StrVisitor).map(Isk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_id_round_trips_through_json_string() {
        let id = DomainId(98765432109u64);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"98765432109\"");
        let back: DomainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn domain_id_accepts_numeric_input() {
        let back: DomainId = serde_json::from_str("1234").unwrap();
        assert_eq!(back, DomainId(1234));
    }

    #[test]
    fn isk_below_safe_integer_serializes_as_number() {
        let v = Isk(750_000_000);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "750000000");
    }

    #[test]
    fn isk_at_or_above_safe_integer_serializes_as_string() {
        let v = Isk(JS_SAFE_INTEGER);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, format!("\"{}\"", JS_SAFE_INTEGER));
    }

    #[test]
    fn isk_round_trip_both_representations() {
        let a: Isk = serde_json::from_str("\"9007199254740993\"").unwrap();
        assert_eq!(a.get(), 9_007_199_254_740_993);
        let b: Isk = serde_json::from_str("42").unwrap();
        assert_eq!(b.get(), 42);
    }
}
