//! Genesis document
//!
//! JSON shape:
//!
//! ```json
//! { "accounts": [{ "address": "…", "coins": [{ "denom": "RUNE", "amount": 1000 }] }],
//!   "stake": { … },
//!   "clp": { … } }
//! ```
//!
//! Import applies accounts, then stake, then governance defaults, then
//! pools. Export reads the same sections back in deterministic order.

use crate::{app::Keepers, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thorchain_core::{Address, Coins, Context, PublicKey, ValidatorUpdate};
use thorchain_modules::{ClpGenesis, GenesisValidator, GovGenesis, StakeGenesis};
use tracing::info;

/// Account entry of the genesis document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Address
    pub address: Address,
    /// Initial balances
    pub coins: Coins,
    /// Initial sequence
    #[serde(default)]
    pub sequence: u64,
    /// Known public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key: Option<PublicKey>,
}

/// Whole genesis document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    /// Accounts, numbered in document order
    pub accounts: Vec<GenesisAccount>,
    /// Stake section
    #[serde(default)]
    pub stake: StakeGenesis,
    /// Liquidity pool section
    #[serde(default)]
    pub clp: ClpGenesis,
}

impl GenesisState {
    /// Decode a JSON document; any error means the chain must not start
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let state: GenesisState = serde_json::from_slice(bytes)?;
        for account in &state.accounts {
            if !account.coins.is_valid() {
                return Err(Error::GenesisMalformed(format!(
                    "account {} has non-canonical coins {}",
                    account.address, account.coins
                )));
            }
        }
        Ok(state)
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Output of a state export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedState {
    /// Genesis document bytes
    pub app_state: Vec<u8>,
    /// Active validators
    pub validators: Vec<GenesisValidator>,
    /// Height the export was taken at
    pub height: u64,
}

fn module_failure(module: &'static str) -> impl Fn(thorchain_modules::ModuleError) -> Error {
    move |err| Error::GenesisInit {
        module,
        reason: err.to_string(),
    }
}

/// Apply a genesis document; returns the initial validator set
pub fn init_genesis(
    keepers: &Keepers,
    ctx: &mut Context<'_>,
    genesis: &GenesisState,
) -> Result<Vec<ValidatorUpdate>> {
    let mut seen = BTreeSet::new();
    for entry in &genesis.accounts {
        if !seen.insert(entry.address) {
            return Err(Error::GenesisInit {
                module: "accounts",
                reason: format!("duplicate account {}", entry.address),
            });
        }
        if let Some(pub_key) = &entry.pub_key {
            if pub_key.address() != entry.address {
                return Err(Error::GenesisInit {
                    module: "accounts",
                    reason: format!("public key does not belong to {}", entry.address),
                });
            }
        }

        let mut account = keepers
            .accounts
            .new_account(ctx, entry.address)
            .map_err(module_failure("accounts"))?;
        account.coins = entry.coins.clone();
        account.sequence = entry.sequence;
        account.pub_key = entry.pub_key;
        keepers
            .accounts
            .set_account(ctx, &account)
            .map_err(module_failure("accounts"))?;
    }

    let updates = keepers
        .stake
        .init_genesis(ctx, &genesis.stake)
        .map_err(module_failure("stake"))?;
    keepers
        .gov
        .init_genesis(ctx, &GovGenesis::default())
        .map_err(module_failure("gov"))?;
    keepers
        .clp
        .init_genesis(ctx, &genesis.clp)
        .map_err(module_failure("clp"))?;

    info!(
        accounts = genesis.accounts.len(),
        validators = updates.len(),
        pools = genesis.clp.pools.len(),
        "Genesis applied"
    );
    Ok(updates)
}

/// Read the exportable state back out
pub fn export_genesis(keepers: &Keepers, ctx: &Context<'_>) -> thorchain_modules::Result<GenesisState> {
    let accounts = keepers
        .accounts
        .iterate_accounts(ctx)?
        .into_iter()
        .map(|account| GenesisAccount {
            address: account.address,
            coins: account.coins,
            sequence: account.sequence,
            pub_key: account.pub_key,
        })
        .collect();

    Ok(GenesisState {
        accounts,
        stake: keepers.stake.export_genesis(ctx)?,
        clp: keepers.clp.export_genesis(ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document() {
        let doc = br#"{ "accounts": [] }"#;
        let state = GenesisState::from_json(doc).unwrap();
        assert!(state.accounts.is_empty());
        assert_eq!(state.stake, StakeGenesis::default());
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            GenesisState::from_json(b"{ \"accounts\": 7 }"),
            Err(Error::GenesisMalformed(_))
        ));
        assert!(matches!(
            GenesisState::from_json(b"not json"),
            Err(Error::GenesisMalformed(_))
        ));
    }

    #[test]
    fn test_non_canonical_coins_rejected() {
        let address = Address::from_bytes([1; 20]).to_hex();
        let doc = format!(
            r#"{{ "accounts": [{{ "address": "{}", "coins": [{{ "denom": "RUNE", "amount": 0 }}] }}] }}"#,
            address
        );
        assert!(matches!(
            GenesisState::from_json(doc.as_bytes()),
            Err(Error::GenesisMalformed(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let state = GenesisState {
            accounts: vec![GenesisAccount {
                address: Address::from_bytes([3; 20]),
                coins: Coins::single("RUNE", 1000),
                sequence: 4,
                pub_key: None,
            }],
            ..Default::default()
        };
        let back = GenesisState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(back, state);
    }
}
