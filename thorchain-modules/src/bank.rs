//! Balances and transfers
//!
//! The bank owns no partition: balances live on accounts, and every change
//! goes through the [`AccountKeeper`].

use crate::{
    auth::{Account, AccountKeeper},
    error::{ModuleError, Result},
    msg::{unrecognized, Message, Msg},
    Handler,
};
use serde::{Deserialize, Serialize};
use thorchain_core::{Address, Coins, Context, Tag, Tags};

/// Balance state manager
#[derive(Debug, Clone)]
pub struct BankKeeper {
    accounts: AccountKeeper,
}

impl BankKeeper {
    /// Create new keeper on top of the account keeper
    pub fn new(accounts: AccountKeeper) -> Self {
        Self { accounts }
    }

    /// Balances of an address (empty if no account)
    pub fn get_coins(&self, ctx: &Context<'_>, address: &Address) -> Result<Coins> {
        Ok(self
            .accounts
            .get_account(ctx, address)?
            .map(|acc| acc.coins)
            .unwrap_or_default())
    }

    /// Whether the address holds at least `amount`
    pub fn has_coins(&self, ctx: &Context<'_>, address: &Address, amount: &Coins) -> Result<bool> {
        Ok(self.get_coins(ctx, address)?.is_all_gte(amount))
    }

    /// Credit coins, creating the account on first sight
    pub fn add_coins(&self, ctx: &mut Context<'_>, address: &Address, amount: &Coins) -> Result<Coins> {
        let mut account = match self.accounts.get_account(ctx, address)? {
            Some(account) => account,
            None => self.accounts.new_account(ctx, *address)?,
        };
        account.coins = account.coins.checked_add(amount)?;
        self.accounts.set_account(ctx, &account)?;
        Ok(account.coins)
    }

    /// Debit coins; balances never go negative
    pub fn subtract_coins(
        &self,
        ctx: &mut Context<'_>,
        address: &Address,
        amount: &Coins,
    ) -> Result<Coins> {
        let mut account: Account = self
            .accounts
            .get_account(ctx, address)?
            .ok_or_else(|| {
                ModuleError::InsufficientFunds(format!("{} has no coins, needs {}", address, amount))
            })?;
        account.coins = account.coins.checked_sub(amount)?;
        self.accounts.set_account(ctx, &account)?;
        Ok(account.coins)
    }

    /// Move coins between addresses
    pub fn send_coins(
        &self,
        ctx: &mut Context<'_>,
        from: &Address,
        to: &Address,
        amount: &Coins,
    ) -> Result<Tags> {
        self.subtract_coins(ctx, from, amount)?;
        self.add_coins(ctx, to, amount)?;
        Ok(vec![
            Tag::new("sender", from.to_hex()),
            Tag::new("recipient", to.to_hex()),
        ])
    }
}

/// Transfer coins to another address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    /// Sender (signer)
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Coins to move
    pub amount: Coins,
}

impl Message for MsgSend {
    const KIND: &'static str = "bank/send";

    fn signers(&self) -> Vec<Address> {
        vec![self.from]
    }

    fn validate_basic(&self) -> Result<()> {
        if !self.amount.is_valid() {
            return Err(ModuleError::InvalidCoins(self.amount.to_string()));
        }
        if self.amount.is_zero() {
            return Err(ModuleError::InvalidCoins("send amount is zero".to_string()));
        }
        Ok(())
    }
}

/// Router entry for `bank`
#[derive(Debug, Clone)]
pub struct BankHandler {
    keeper: BankKeeper,
}

impl BankHandler {
    /// Create handler
    pub fn new(keeper: BankKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for BankHandler {
    fn route(&self) -> &'static str {
        "bank"
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags> {
        match msg {
            Msg::Send(msg) => self.keeper.send_coins(ctx, &msg.from, &msg.to, &msg.amount),
            other => Err(unrecognized(self, other)),
        }
    }
}
