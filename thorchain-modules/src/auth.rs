//! Accounts: numbering, sequences, public keys and balances
//!
//! # Keys (`acc` partition)
//!
//! - `0x01 ‖ address` → [`Account`]
//! - `globalAccountNumber` → next account number

use crate::error::{ModuleError, Result};
use serde::{Deserialize, Serialize};
use thorchain_core::{Address, Coins, Context, PublicKey, StoreKey};

const ACCOUNT_PREFIX: &[u8] = &[0x01];
const GLOBAL_ACCOUNT_NUMBER_KEY: &[u8] = b"globalAccountNumber";

/// On-chain account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Address
    pub address: Address,
    /// Public key, known after the first signed transaction
    pub pub_key: Option<PublicKey>,
    /// Unique, never reused
    pub account_number: u64,
    /// Replay-protection counter
    pub sequence: u64,
    /// Balances
    pub coins: Coins,
}

fn account_key(address: &Address) -> Vec<u8> {
    [ACCOUNT_PREFIX, address.as_bytes()].concat()
}

/// Account state manager
#[derive(Debug, Clone)]
pub struct AccountKeeper {
    key: StoreKey,
}

impl AccountKeeper {
    /// Create new keeper bound to its partition
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    /// Partition key
    pub fn store_key(&self) -> &StoreKey {
        &self.key
    }

    /// Take the next account number from the counter
    pub fn next_account_number(&self, ctx: &mut Context<'_>) -> Result<u64> {
        let number = ctx
            .get::<u64>(&self.key, GLOBAL_ACCOUNT_NUMBER_KEY)?
            .unwrap_or(0);
        let next = number
            .checked_add(1)
            .ok_or_else(|| ModuleError::Internal("account number overflow".to_string()))?;
        ctx.set(&self.key, GLOBAL_ACCOUNT_NUMBER_KEY, &next)?;
        Ok(number)
    }

    /// Fresh account with a new number; not stored until `set_account`
    pub fn new_account(&self, ctx: &mut Context<'_>, address: Address) -> Result<Account> {
        let account_number = self.next_account_number(ctx)?;
        Ok(Account {
            address,
            pub_key: None,
            account_number,
            sequence: 0,
            coins: Coins::empty(),
        })
    }

    /// Read one account
    pub fn get_account(&self, ctx: &Context<'_>, address: &Address) -> Result<Option<Account>> {
        Ok(ctx.get(&self.key, &account_key(address))?)
    }

    /// Read one account, failing if absent
    pub fn must_get_account(&self, ctx: &Context<'_>, address: &Address) -> Result<Account> {
        self.get_account(ctx, address)?
            .ok_or(ModuleError::UnknownAddress(*address))
    }

    /// Write one account
    pub fn set_account(&self, ctx: &mut Context<'_>, account: &Account) -> Result<()> {
        if !account.coins.is_valid() {
            return Err(ModuleError::InvalidCoins(account.coins.to_string()));
        }
        ctx.set(&self.key, &account_key(&account.address), account)?;
        Ok(())
    }

    /// Stored sequence
    pub fn get_sequence(&self, ctx: &Context<'_>, address: &Address) -> Result<u64> {
        Ok(self.must_get_account(ctx, address)?.sequence)
    }

    /// Stored public key
    pub fn get_pub_key(&self, ctx: &Context<'_>, address: &Address) -> Result<Option<PublicKey>> {
        Ok(self.must_get_account(ctx, address)?.pub_key)
    }

    /// Every account, in address order
    pub fn iterate_accounts(&self, ctx: &Context<'_>) -> Result<Vec<Account>> {
        Ok(ctx.prefix_values(&self.key, ACCOUNT_PREFIX)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use thorchain_core::{BlockHeader, MemStore};

    #[test]
    fn test_account_numbers_increase() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let keeper = AccountKeeper::new(StoreKey::new("acc"));

        let a = keeper.new_account(&mut ctx, Address::from_bytes([1; 20])).unwrap();
        let b = keeper.new_account(&mut ctx, Address::from_bytes([2; 20])).unwrap();
        let c = keeper.new_account(&mut ctx, Address::from_bytes([1; 20])).unwrap();
        assert_eq!((a.account_number, b.account_number, c.account_number), (0, 1, 2));
    }

    #[test]
    fn test_iterate_in_address_order() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let keeper = AccountKeeper::new(StoreKey::new("acc"));

        for byte in [9u8, 3, 7] {
            let acc = keeper.new_account(&mut ctx, Address::from_bytes([byte; 20])).unwrap();
            keeper.set_account(&mut ctx, &acc).unwrap();
        }

        let order: Vec<u8> = keeper
            .iterate_accounts(&ctx)
            .unwrap()
            .iter()
            .map(|a| a.address.as_bytes()[0])
            .collect();
        assert_eq!(order, vec![3, 7, 9]);
    }

    #[test]
    fn test_missing_account() {
        let mut store = MemStore::new();
        let ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let keeper = AccountKeeper::new(StoreKey::new("acc"));
        assert!(matches!(
            keeper.get_sequence(&ctx, &Address::from_bytes([4; 20])),
            Err(ModuleError::UnknownAddress(_))
        ));
    }
}
