//! Coordinates of contract instances across chains.
//!
//! A `Point` identifies one contract (chain + address) and a `Vector` a
//! directed pathway between two of them. Addresses are opaque and tagged
//! with their chain family; all comparisons go through the family's
//! normalization, never through raw string equality.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eid(pub u32);

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Eid {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Address representation used by a chain family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    /// 20-byte hex (EVM chains)
    Evm,

    /// 32-byte hex or felt (Aptos, Starknet, TON-style chains)
    Bytes32,

    /// Base58 public keys (Solana)
    Base58,
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Address parsing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Invalid hex address '{0}'")]
    InvalidHex(String),

    #[error("Hex address '{0}' is longer than 32 bytes")]
    TooLong(String),

    #[error("Invalid base58 address '{0}'")]
    InvalidBase58(String),
}

/// A chain-family-tagged contract address.
///
/// Equality, hashing and ordering use the normalized form:
/// hex addresses compare case-insensitively and ignore leading zeros
/// (so a 20-byte EVM address equals its 32-byte left-padded form),
/// base58 addresses compare exactly. Ordering is ascending by numeric
/// value for hex families, which is the order contracts expect for
/// address lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    family: AddressFamily,
    raw: String,
    normalized: String,
}

impl Address {
    /// Parse an address, inferring its family from the representation
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let raw = value.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(AddressError::InvalidHex(raw.to_string()));
            }
            if digits.len() > 64 {
                return Err(AddressError::TooLong(raw.to_string()));
            }

            let family = if digits.len() == 40 {
                AddressFamily::Evm
            } else {
                AddressFamily::Bytes32
            };

            let stripped = digits.trim_start_matches('0').to_ascii_lowercase();
            let normalized = if stripped.is_empty() {
                "0x0".to_string()
            } else {
                format!("0x{}", stripped)
            };

            return Ok(Self {
                family,
                raw: raw.to_string(),
                normalized,
            });
        }

        if raw.chars().all(|c| BASE58_ALPHABET.contains(c)) {
            return Ok(Self {
                family: AddressFamily::Base58,
                raw: raw.to_string(),
                normalized: raw.to_string(),
            });
        }

        Err(AddressError::InvalidBase58(raw.to_string()))
    }

    /// The zero address, used where a hex chain has nothing configured
    pub fn zero() -> Self {
        Self {
            family: AddressFamily::Bytes32,
            raw: "0x0".to_string(),
            normalized: "0x0".to_string(),
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// The address as it was declared
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The normalized form used for comparisons
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether this is the zero address of a hex family
    pub fn is_zero(&self) -> bool {
        self.normalized == "0x0"
    }

    fn sort_key(&self) -> (u8, usize, &str) {
        match self.family {
            AddressFamily::Evm | AddressFamily::Bytes32 => (0, self.normalized.len(), &self.normalized),
            AddressFamily::Base58 => (1, 0, &self.normalized),
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.raw
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Sort addresses into the canonical (ascending) order and drop duplicates
pub fn canonical_addresses<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> Vec<Address> {
    let mut sorted: Vec<Address> = addresses.into_iter().cloned().collect();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Compare two address lists as sets
pub fn same_address_set(a: &[Address], b: &[Address]) -> bool {
    canonical_addresses(a) == canonical_addresses(b)
}

/// One contract instance: a chain plus an address on that chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub eid: Eid,
    pub address: Address,
}

impl Point {
    pub fn new(eid: Eid, address: Address) -> Self {
        Self { eid, address }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} @ {}]", self.address, self.eid)
    }
}

/// A directed pathway between two contract instances
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector {
    pub from: Point,
    pub to: Point,
}

impl Vector {
    pub fn new(from: Point, to: Point) -> Self {
        Self { from, to }
    }

    /// A pathway can only connect two different chains
    pub fn is_possible(&self) -> bool {
        self.from.eid != self.to.eid
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: &str) -> Address {
        Address::parse(value).unwrap()
    }

    #[test]
    fn test_family_inference() {
        assert_eq!(
            addr("0x5FbDB2315678afecb367f032d93F642f64180aa3").family(),
            AddressFamily::Evm
        );
        assert_eq!(addr("0x1").family(), AddressFamily::Bytes32);
        assert_eq!(
            addr("7a4WjyR8VZ7yZz5XJAKm39BUGn5iT9CKcv2pmG9tdXVH").family(),
            AddressFamily::Base58
        );
    }

    #[test]
    fn test_hex_comparison_is_case_insensitive() {
        assert_eq!(
            addr("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            addr("0x5fbdb2315678afecb367f032d93f642f64180aa3")
        );
    }

    #[test]
    fn test_padded_hex_equals_short_hex() {
        assert_eq!(
            addr("0x0000000000000000000000005fbdb2315678afecb367f032d93f642f64180aa3"),
            addr("0x5fbdb2315678afecb367f032d93f642f64180aa3")
        );
    }

    #[test]
    fn test_base58_comparison_is_exact() {
        assert_ne!(addr("abc"), addr("aBc"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(Address::parse(""), Err(AddressError::Empty));
        assert!(matches!(Address::parse("0xzz"), Err(AddressError::InvalidHex(_))));
        assert!(matches!(Address::parse("0OIl"), Err(AddressError::InvalidBase58(_))));
        assert!(matches!(
            Address::parse(&format!("0x{}", "1".repeat(65))),
            Err(AddressError::TooLong(_))
        ));
    }

    #[test]
    fn test_canonical_order_is_numeric() {
        let sorted = canonical_addresses(&[addr("0xff"), addr("0x0a"), addr("0x100"), addr("0xFF")]);
        assert_eq!(sorted, vec![addr("0xa"), addr("0xff"), addr("0x100")]);
    }

    #[test]
    fn test_same_address_set_ignores_order() {
        assert!(same_address_set(&[addr("0x1"), addr("0x2")], &[addr("0x2"), addr("0x1")]));
        assert!(!same_address_set(&[addr("0x1")], &[addr("0x1"), addr("0x2")]));
    }

    #[test]
    fn test_vector_possibility() {
        let a = Point::new(Eid(1), addr("0x1"));
        let b = Point::new(Eid(2), addr("0x1"));
        let c = Point::new(Eid(1), addr("0x2"));

        assert!(Vector::new(a.clone(), b).is_possible());
        assert!(!Vector::new(a, c).is_possible());
    }

    #[test]
    fn test_point_deserialization() {
        let point: Point = serde_yaml::from_str("eid: 30101\naddress: \"0xABC\"").unwrap();
        assert_eq!(point, Point::new(Eid(30101), addr("0xabc")));
    }
}
