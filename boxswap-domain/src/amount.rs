//! Decimal string encoding for 128-bit amounts.
//!
//! Reserves, share balances and scaled prices routinely exceed `u64::MAX`.
//! JSON numbers and serde's buffered content (internally tagged enums,
//! `serde_json::Value`) cannot carry such values, so amounts are written as
//! decimal strings. Plain integers are still accepted on input.
//!
//! ```
//! # use serde::{Deserialize, Serialize};
//! #[derive(Serialize, Deserialize)]
//! struct Deposit {
//!     #[serde(with = "boxswap_domain::amount")]
//!     base: u128,
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Write an amount as a decimal string
pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

/// Read an amount from a decimal string or a non-negative integer
pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a non-negative integer or a decimal string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u128, E> {
        value
            .parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u128, E> {
        Ok(u128::from(value))
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<u128, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u128, E> {
        u128::try_from(value).map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct Amount(#[serde(with = "crate::amount")] u128);

/// Same encoding for the values of a keyed ledger
pub mod map {
    use super::*;

    /// Write every value as a decimal string
    pub fn serialize<K, S>(map: &BTreeMap<K, u128>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(key, value)| (key, Amount(*value))))
    }

    /// Read a map whose values are decimal strings or integers
    pub fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, u128>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<K, Amount>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(key, amount)| (key, amount.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "crate::amount")]
        value: u128,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum Tagged {
        Minted {
            #[serde(with = "crate::amount")]
            shares: u128,
        },
    }

    #[test]
    fn test_amount_written_as_string() {
        let value = Holder { value: u128::MAX };
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, format!("{{\"value\":\"{}\"}}", u128::MAX));
        assert_eq!(serde_json::from_str::<Holder>(&text).unwrap(), value);
    }

    #[test]
    fn test_amount_accepts_integers() {
        let holder: Holder = serde_json::from_value(json!({ "value": 42 })).unwrap();
        assert_eq!(holder.value, 42);
        assert!(serde_json::from_value::<Holder>(json!({ "value": -1 })).is_err());
        assert!(serde_json::from_value::<Holder>(json!({ "value": "1e3" })).is_err());
    }

    #[test]
    fn test_amount_survives_buffered_content() {
        // internally tagged enums buffer their fields before dispatch
        let event = Tagged::Minted {
            shares: 1_000_000_000_000_000_000_000,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["shares"], "1000000000000000000000");
        assert_eq!(serde_json::from_value::<Tagged>(value).unwrap(), event);
    }

    #[test]
    fn test_amount_map() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Ledger {
            #[serde(with = "crate::amount::map")]
            shares: BTreeMap<String, u128>,
        }

        let ledger = Ledger {
            shares: BTreeMap::from([("lp".to_string(), 1_000_000_000_000_000_000_000)]),
        };
        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(value["shares"]["lp"], "1000000000000000000000");
        assert_eq!(serde_json::from_value::<Ledger>(value).unwrap(), ledger);
    }
}
