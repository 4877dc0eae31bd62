//! Transaction-level errors
//!
//! A `ModuleError` aborts one transaction and is reported back to the
//! consensus engine as a [`TxError`] (codespace, code, log). It never stops
//! the node; storage failures are the exception and surface as `Internal`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use thorchain_core::Address;

/// Result type for keeper and handler operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Codespace of errors shared by every module
pub const CODESPACE_SDK: &str = "sdk";

/// Recoverable, per-transaction errors
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Unexpected failure underneath a handler
    #[error("internal error: {0}")]
    Internal(String),

    /// Transaction or message bytes could not be decoded
    #[error("tx parse error: {0}")]
    TxDecode(String),

    /// Signer sequence does not match the stored one
    #[error("invalid sequence: expected {expected}, got {got}")]
    InvalidSequence {
        /// Stored sequence
        expected: u64,
        /// Sequence in the signature
        got: u64,
    },

    /// Missing or invalid signature
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Balance too low for the requested movement
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Message kind or query nobody handles
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Malformed address
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Public key does not belong to the account
    #[error("invalid pubkey: {0}")]
    InvalidPubKey(String),

    /// No account at this address
    #[error("account {0} does not exist")]
    UnknownAddress(Address),

    /// Malformed coin set
    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    /// Memo over the limit
    #[error("maximum number of characters is {max} but received {len} characters")]
    MemoTooLarge {
        /// Memo length
        len: usize,
        /// Allowed length
        max: usize,
    },

    /// Fee payer cannot cover the fee
    #[error("insufficient fee: {0}")]
    InsufficientFee(String),

    /// Generic malformed message
    #[error("{0}")]
    InvalidMsg(String),

    /// Validator already registered
    #[error("validator already exists for this operator or pubkey")]
    ValidatorExists,

    /// Validator lookup failed
    #[error("validator does not exist for that address")]
    ValidatorNotFound,

    /// Delegation lookup failed
    #[error("no delegation for this (address, validator) pair")]
    DelegationNotFound,

    /// Unbond more shares than held
    #[error("insufficient delegation shares: {0}")]
    InsufficientShares(String),

    /// Coin denom is not the bond denom
    #[error("invalid coin denomination: expected {expected}, got {got}")]
    BadDenom {
        /// Bond denom
        expected: String,
        /// Denom in the message
        got: String,
    },

    /// Bond would take total bonded tokens past the consensus power limit
    #[error("bonded tokens would exceed the maximum voting power {max}")]
    PowerOverflow {
        /// Largest total the consensus engine accepts
        max: u64,
    },

    /// Unjail of a validator that is not jailed
    #[error("validator not jailed, cannot be unjailed")]
    ValidatorNotJailed,

    /// Unjail before the jail period ended
    #[error("validator still jailed, cannot yet be unjailed")]
    ValidatorJailed,

    /// Validator was permanently removed for double signing
    #[error("validator is tombstoned")]
    ValidatorTombstoned,

    /// Proposal lookup failed
    #[error("unknown proposal {0}")]
    UnknownProposal(u64),

    /// Deposit or vote on a proposal in the wrong stage
    #[error("proposal {0} is not in the right period")]
    InactiveProposal(u64),

    /// Malformed proposal
    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    /// Pool already exists
    #[error("pool {0} already exists")]
    PoolExists(String),

    /// Pool lookup failed
    #[error("pool {0} does not exist")]
    PoolNotFound(String),

    /// Swap output under the requested minimum
    #[error("swap output {out} below minimum {min_out}")]
    SlippageExceeded {
        /// Computed output
        out: u64,
        /// Requested minimum
        min_out: u64,
    },

    /// Swap or deposit too small to move anything
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// Deposit would push a pool reserve past what it can hold
    #[error("pool {0} reserves would overflow")]
    PoolOverflow(String),

    /// Packet addressed to another chain
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Packet delivered out of order
    #[error("invalid packet sequence: expected {expected}, got {got}")]
    InvalidPacketSequence {
        /// Next expected ingress sequence
        expected: u64,
        /// Sequence delivered
        got: u64,
    },
}

impl ModuleError {
    /// (codespace, code) pair reported to the consensus engine
    pub fn code(&self) -> (&'static str, u32) {
        match self {
            ModuleError::Internal(_) => (CODESPACE_SDK, 1),
            ModuleError::TxDecode(_) => (CODESPACE_SDK, 2),
            ModuleError::InvalidSequence { .. } => (CODESPACE_SDK, 3),
            ModuleError::Unauthorized(_) => (CODESPACE_SDK, 4),
            ModuleError::InsufficientFunds(_) => (CODESPACE_SDK, 5),
            ModuleError::UnknownRequest(_) => (CODESPACE_SDK, 6),
            ModuleError::InvalidAddress(_) => (CODESPACE_SDK, 7),
            ModuleError::InvalidPubKey(_) => (CODESPACE_SDK, 8),
            ModuleError::UnknownAddress(_) => (CODESPACE_SDK, 9),
            ModuleError::InvalidCoins(_) => (CODESPACE_SDK, 11),
            ModuleError::MemoTooLarge { .. } => (CODESPACE_SDK, 13),
            ModuleError::InsufficientFee(_) => (CODESPACE_SDK, 14),
            ModuleError::InvalidMsg(_) => (CODESPACE_SDK, 15),

            ModuleError::ValidatorExists => ("stake", 101),
            ModuleError::ValidatorNotFound => ("stake", 102),
            ModuleError::DelegationNotFound => ("stake", 103),
            ModuleError::InsufficientShares(_) => ("stake", 104),
            ModuleError::BadDenom { .. } => ("stake", 105),
            ModuleError::PowerOverflow { .. } => ("stake", 106),

            ModuleError::ValidatorNotJailed => ("slashing", 102),
            ModuleError::ValidatorJailed => ("slashing", 103),
            ModuleError::ValidatorTombstoned => ("slashing", 104),

            ModuleError::UnknownProposal(_) => ("gov", 1),
            ModuleError::InactiveProposal(_) => ("gov", 2),
            ModuleError::InvalidProposal(_) => ("gov", 3),

            ModuleError::PoolExists(_) => ("clp", 1),
            ModuleError::PoolNotFound(_) => ("clp", 2),
            ModuleError::SlippageExceeded { .. } => ("clp", 3),
            ModuleError::InsufficientLiquidity(_) => ("clp", 4),
            ModuleError::PoolOverflow(_) => ("clp", 5),

            ModuleError::InvalidPacket(_) => ("ibc", 1),
            ModuleError::InvalidPacketSequence { .. } => ("ibc", 2),
        }
    }
}

impl From<thorchain_core::Error> for ModuleError {
    fn from(err: thorchain_core::Error) -> Self {
        match err {
            thorchain_core::Error::InsufficientCoins(msg) => ModuleError::InsufficientFunds(msg),
            thorchain_core::Error::InvalidCoins(msg) => ModuleError::InvalidCoins(msg),
            thorchain_core::Error::InvalidAddress(msg) => ModuleError::InvalidAddress(msg),
            other => ModuleError::Internal(other.to_string()),
        }
    }
}

impl From<bincode::Error> for ModuleError {
    fn from(err: bincode::Error) -> Self {
        ModuleError::TxDecode(err.to_string())
    }
}

/// Structured failure result of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxError {
    /// Module namespace of the code
    pub codespace: String,
    /// Non-zero result code
    pub code: u32,
    /// Human-readable message
    pub log: String,
}

impl From<ModuleError> for TxError {
    fn from(err: ModuleError) -> Self {
        let (codespace, code) = err.code();
        TxError {
            codespace: codespace.to_string(),
            code,
            log: err.to_string(),
        }
    }
}

impl std::fmt::Display for TxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: {}", self.codespace, self.code, self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_error_from_module_error() {
        let err: TxError = ModuleError::InvalidSequence { expected: 1, got: 0 }.into();
        assert_eq!(err.codespace, "sdk");
        assert_eq!(err.code, 3);
        assert!(err.log.contains("expected 1"));
    }

    #[test]
    fn test_core_error_mapping() {
        let err: ModuleError = thorchain_core::Error::InsufficientCoins("x".into()).into();
        assert!(matches!(err, ModuleError::InsufficientFunds(_)));

        let err: ModuleError = thorchain_core::Error::NotLoaded.into();
        assert_eq!(err.code(), ("sdk", 1));
    }

    #[test]
    fn test_codes_never_zero() {
        let samples = vec![
            ModuleError::ValidatorExists,
            ModuleError::UnknownProposal(3),
            ModuleError::PoolNotFound("BNB".into()),
            ModuleError::InvalidPacketSequence { expected: 0, got: 1 },
        ];
        for err in samples {
            assert_ne!(err.code().1, 0);
        }
    }
}
