//! Core types shared by the store, the modules and the application
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for state, JSON for genesis)
//! - Canonical forms (sorted, de-duplicated coin lists)
//! - Integer amounts, no floating point anywhere near state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-size byte arrays as hex in JSON, raw bytes in bincode
mod hex_array {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let raw: Vec<u8> = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(s).map_err(de::Error::custom)?
        } else {
            Vec::<u8>::deserialize(deserializer)?
        };
        let len = raw.len();
        raw.try_into()
            .map_err(|_| de::Error::custom(format!("expected {} bytes, got {}", N, len)))
    }
}

fn parse_hex_array<const N: usize>(s: &str) -> crate::Result<[u8; N]> {
    let raw = hex::decode(s).map_err(|e| crate::Error::InvalidAddress(e.to_string()))?;
    raw.try_into()
        .map_err(|_| crate::Error::InvalidAddress(format!("expected {} bytes", N)))
}

/// Account address: first 20 bytes of SHA-256 over the public key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_array")] [u8; 20]);

impl Address {
    /// Address length in bytes
    pub const LEN: usize = 20;

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_hex_array(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

/// Ed25519 public key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex_array")] [u8; 32]);

impl PublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Address derived from this key
    pub fn address(&self) -> Address {
        crate::crypto::address_from_pubkey(self)
    }
}

impl FromStr for PublicKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_hex_array(s).map(Self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// Digital signature (Ed25519)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex_array")] [u8; 64]);

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Verify signature
    pub fn verify(&self, message: &[u8], public_key: &PublicKey) -> bool {
        crate::crypto::verify_signature(message, self, public_key)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", hex::encode(&self.0[..8]))
    }
}

/// A single denomination amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination (e.g. `RUNE`)
    pub denom: String,
    /// Amount in base units
    pub amount: u64,
}

impl Coin {
    /// Create new coin
    pub fn new(denom: impl Into<String>, amount: u64) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Canonical coin set: sorted by denom, no duplicates, no zero amounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Empty set
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a canonical set, merging duplicate denoms
    pub fn new(coins: impl IntoIterator<Item = Coin>) -> crate::Result<Self> {
        let mut out = Coins::empty();
        for coin in coins {
            if coin.denom.is_empty() {
                return Err(crate::Error::InvalidCoins("empty denom".to_string()));
            }
            out = out.checked_add(&Coins(vec![coin]))?;
        }
        Ok(out)
    }

    /// Single-denom set
    pub fn single(denom: impl Into<String>, amount: u64) -> Self {
        let coin = Coin::new(denom, amount);
        if coin.amount == 0 {
            Self::empty()
        } else {
            Self(vec![coin])
        }
    }

    /// Whether this set is already canonical
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|c| c.amount > 0 && !c.denom.is_empty())
            && self.0.windows(2).all(|w| w[0].denom < w[1].denom)
    }

    /// Amount of one denom (0 if absent)
    pub fn amount_of(&self, denom: &str) -> u64 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    /// No coins at all
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in denom order
    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    /// True if every denom in `other` is covered by `self`
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.iter().all(|c| self.amount_of(&c.denom) >= c.amount)
    }

    /// Checked sum
    pub fn checked_add(&self, other: &Coins) -> crate::Result<Coins> {
        let mut merged: std::collections::BTreeMap<String, u64> =
            self.0.iter().map(|c| (c.denom.clone(), c.amount)).collect();
        for coin in other.iter() {
            let entry = merged.entry(coin.denom.clone()).or_insert(0);
            *entry = entry.checked_add(coin.amount).ok_or_else(|| {
                crate::Error::InvalidCoins(format!("overflow adding {}", coin))
            })?;
        }
        Ok(Self::from_map(merged))
    }

    /// Checked difference; fails if any denom would go negative
    pub fn checked_sub(&self, other: &Coins) -> crate::Result<Coins> {
        let mut merged: std::collections::BTreeMap<String, u64> =
            self.0.iter().map(|c| (c.denom.clone(), c.amount)).collect();
        for coin in other.iter() {
            let have = merged.get(&coin.denom).copied().unwrap_or(0);
            let left = have.checked_sub(coin.amount).ok_or_else(|| {
                crate::Error::InsufficientCoins(format!("have {}{}, need {}", have, coin.denom, coin))
            })?;
            merged.insert(coin.denom.clone(), left);
        }
        Ok(Self::from_map(merged))
    }

    fn from_map(map: std::collections::BTreeMap<String, u64>) -> Self {
        Self(
            map.into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Block header fields the state machine is allowed to depend on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain ID
    pub chain_id: String,
    /// Block height
    pub height: u64,
    /// Block time as agreed by consensus (never the local clock)
    pub time: DateTime<Utc>,
    /// Proposer consensus address
    pub proposer: Option<Address>,
}

impl BlockHeader {
    /// Header used for genesis and read-only contexts
    pub fn genesis(chain_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            chain_id: chain_id.into(),
            height: 0,
            time,
            proposer: None,
        }
    }
}

/// Key/value tag emitted by lifecycle hooks and message handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered tag list
pub type Tags = Vec<Tag>;

/// Change to the consensus validator set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Consensus public key
    pub pub_key: PublicKey,
    /// New voting power (0 removes the validator)
    pub power: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coins_canonical_order() {
        let coins = Coins::new(vec![
            Coin::new("RUNE", 10),
            Coin::new("BNB", 5),
            Coin::new("RUNE", 7),
            Coin::new("ETH", 0),
        ])
        .unwrap();

        assert!(coins.is_valid());
        assert_eq!(coins.amount_of("RUNE"), 17);
        assert_eq!(coins.amount_of("ETH"), 0);
        assert_eq!(coins.to_string(), "5BNB,17RUNE");
    }

    #[test]
    fn test_coins_sub_never_negative() {
        let have = Coins::single("RUNE", 100);
        let left = have.checked_sub(&Coins::single("RUNE", 100)).unwrap();
        assert!(left.is_zero());

        let err = have.checked_sub(&Coins::single("RUNE", 101)).unwrap_err();
        assert!(err.to_string().contains("Insufficient"));

        assert!(have.checked_sub(&Coins::single("BNB", 1)).is_err());
    }

    #[test]
    fn test_address_hex_json() {
        let addr = Address::from_bytes([0xab; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(20)));

        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("abcd".parse::<Address>().is_err());
        assert!(serde_json::from_str::<Address>("\"abcd\"").is_err());
    }

    #[test]
    fn test_signature_bincode() {
        let sig = Signature::from_bytes([7u8; 64]);
        let bytes = bincode::serialize(&sig).unwrap();
        let back: Signature = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, sig);
    }
}
