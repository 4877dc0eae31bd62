//! Validators, delegations and the bonded validator set
//!
//! # Keys (`stake` partition)
//!
//! - `params` → [`StakeParams`]
//! - `0x21 ‖ operator` → [`Validator`]
//! - `0x22 ‖ consensus address` → operator address
//! - `0x31 ‖ delegator ‖ operator` → [`Delegation`]
//! - `0x11 ‖ operator` → power in the last validator set
//!
//! # Voting power
//!
//! Power is the validator's bonded tokens; jailed validators have none. The
//! active set is the top `max_validators` by (power desc, operator asc), and
//! every end-block reports only the difference to the previous set.
//!
//! Tokens bonded across all validators never exceed [`MAX_TOTAL_POWER`], so
//! every power and every sum of powers fits the consensus engine's `i64`.

use crate::{
    bank::BankKeeper,
    error::{ModuleError, Result},
    msg::{unrecognized, Message, Msg},
    Handler,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thorchain_core::{Address, Coin, Coins, Context, PublicKey, StoreKey, Tag, Tags, ValidatorUpdate};

/// Native staking denom
pub const DEFAULT_BOND_DENOM: &str = "RUNE";

/// Largest total voting power CometBFT accepts (`i64::MAX / 8`)
pub const MAX_TOTAL_POWER: u64 = (i64::MAX as u64) / 8;

const PARAMS_KEY: &[u8] = b"params";
const LAST_VALIDATOR_PREFIX: &[u8] = &[0x11];
const VALIDATOR_PREFIX: &[u8] = &[0x21];
const CONS_INDEX_PREFIX: &[u8] = &[0x22];
const DELEGATION_PREFIX: &[u8] = &[0x31];

const MAX_MONIKER_LEN: usize = 70;

fn validator_key(operator: &Address) -> Vec<u8> {
    [VALIDATOR_PREFIX, operator.as_bytes()].concat()
}

fn cons_index_key(cons_addr: &Address) -> Vec<u8> {
    [CONS_INDEX_PREFIX, cons_addr.as_bytes()].concat()
}

fn delegation_key(delegator: &Address, operator: &Address) -> Vec<u8> {
    [DELEGATION_PREFIX, delegator.as_bytes(), operator.as_bytes()].concat()
}

fn last_validator_key(operator: &Address) -> Vec<u8> {
    [LAST_VALIDATOR_PREFIX, operator.as_bytes()].concat()
}

fn decimal_overflow() -> ModuleError {
    ModuleError::Internal("decimal overflow".to_string())
}

/// Staking parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeParams {
    /// Denom that can be bonded
    pub bond_denom: String,
    /// Size of the active validator set
    pub max_validators: u16,
}

impl Default for StakeParams {
    fn default() -> Self {
        Self {
            bond_denom: DEFAULT_BOND_DENOM.to_string(),
            max_validators: 100,
        }
    }
}

/// A validator candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Operator account
    pub operator: Address,
    /// Consensus key used to sign blocks
    pub cons_pub_key: PublicKey,
    /// Display name
    pub moniker: String,
    /// Bonded tokens
    pub tokens: u64,
    /// Shares issued to delegators
    pub delegator_shares: Decimal,
    /// Excluded from the active set
    pub jailed: bool,
}

impl Validator {
    /// New validator without any stake
    pub fn new(operator: Address, cons_pub_key: PublicKey, moniker: impl Into<String>) -> Self {
        Self {
            operator,
            cons_pub_key,
            moniker: moniker.into(),
            tokens: 0,
            delegator_shares: Decimal::ZERO,
            jailed: false,
        }
    }

    /// Consensus address (as reported by the consensus engine)
    pub fn cons_address(&self) -> Address {
        self.cons_pub_key.address()
    }

    /// Voting power
    pub fn power(&self) -> u64 {
        if self.jailed {
            0
        } else {
            self.tokens
        }
    }

    /// Shares issued for a new bond of `amount` tokens
    pub fn shares_for(&self, amount: u64) -> Result<Decimal> {
        if self.tokens == 0 || self.delegator_shares.is_zero() {
            return Ok(Decimal::from(amount));
        }
        Decimal::from(amount)
            .checked_mul(self.delegator_shares)
            .and_then(|v| v.checked_div(Decimal::from(self.tokens)))
            .map(|v| v.normalize())
            .ok_or_else(decimal_overflow)
    }

    /// Exact token value of `shares`
    pub fn token_value(&self, shares: Decimal) -> Result<Decimal> {
        if self.delegator_shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        shares
            .checked_mul(Decimal::from(self.tokens))
            .and_then(|v| v.checked_div(self.delegator_shares))
            .ok_or_else(decimal_overflow)
    }

    /// Tokens paid out for `shares`, rounded down
    pub fn tokens_for(&self, shares: Decimal) -> Result<u64> {
        self.token_value(shares)?
            .floor()
            .to_u64()
            .ok_or_else(decimal_overflow)
    }
}

/// Shares a delegator holds with one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Delegator account
    pub delegator: Address,
    /// Validator operator
    pub validator: Address,
    /// Shares held
    pub shares: Decimal,
}

/// Entry of the last reported validator set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LastValidator {
    pub_key: PublicKey,
    power: u64,
}

/// Stake section of the genesis document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeGenesis {
    /// Parameters
    pub params: StakeParams,
    /// Validators
    pub validators: Vec<Validator>,
    /// Delegations
    pub delegations: Vec<Delegation>,
}

/// Validator as listed next to an exported genesis document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Consensus key
    pub pub_key: PublicKey,
    /// Voting power
    pub power: u64,
    /// Moniker
    pub name: String,
}

/// Stake state manager
#[derive(Debug, Clone)]
pub struct StakeKeeper {
    key: StoreKey,
    bank: BankKeeper,
}

impl StakeKeeper {
    /// Create new keeper bound to its partition and the bank
    pub fn new(key: StoreKey, bank: BankKeeper) -> Self {
        Self { key, bank }
    }

    /// Current parameters
    pub fn params(&self, ctx: &Context<'_>) -> Result<StakeParams> {
        Ok(ctx.get(&self.key, PARAMS_KEY)?.unwrap_or_default())
    }

    /// Replace parameters
    pub fn set_params(&self, ctx: &mut Context<'_>, params: &StakeParams) -> Result<()> {
        ctx.set(&self.key, PARAMS_KEY, params)?;
        Ok(())
    }

    /// Validator by operator
    pub fn get_validator(&self, ctx: &Context<'_>, operator: &Address) -> Result<Option<Validator>> {
        Ok(ctx.get(&self.key, &validator_key(operator))?)
    }

    /// Validator by consensus address
    pub fn get_validator_by_cons_addr(
        &self,
        ctx: &Context<'_>,
        cons_addr: &Address,
    ) -> Result<Option<Validator>> {
        match ctx.get::<Address>(&self.key, &cons_index_key(cons_addr))? {
            Some(operator) => self.get_validator(ctx, &operator),
            None => Ok(None),
        }
    }

    /// Write a validator and its consensus index
    pub fn set_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> Result<()> {
        ctx.set(&self.key, &validator_key(&validator.operator), validator)?;
        ctx.set(
            &self.key,
            &cons_index_key(&validator.cons_address()),
            &validator.operator,
        )?;
        Ok(())
    }

    /// Every validator, in operator order
    pub fn iterate_validators(&self, ctx: &Context<'_>) -> Result<Vec<Validator>> {
        Ok(ctx.prefix_values(&self.key, VALIDATOR_PREFIX)?)
    }

    /// One delegation
    pub fn get_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<Option<Delegation>> {
        Ok(ctx.get(&self.key, &delegation_key(delegator, operator))?)
    }

    fn set_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<()> {
        let key = delegation_key(&delegation.delegator, &delegation.validator);
        if delegation.shares.is_zero() {
            ctx.delete(&self.key, &key)?;
        } else {
            ctx.set(&self.key, &key, delegation)?;
        }
        Ok(())
    }

    /// Every delegation, in (delegator, operator) order
    pub fn iterate_delegations(&self, ctx: &Context<'_>) -> Result<Vec<Delegation>> {
        Ok(ctx.prefix_values(&self.key, DELEGATION_PREFIX)?)
    }

    /// Delegations of one delegator
    pub fn delegations_of(&self, ctx: &Context<'_>, delegator: &Address) -> Result<Vec<Delegation>> {
        let prefix = [DELEGATION_PREFIX, delegator.as_bytes()].concat();
        Ok(ctx.prefix_values(&self.key, &prefix)?)
    }

    /// Bond `amount` of the bond denom from `delegator` to `validator`
    pub fn delegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &mut Validator,
        amount: u64,
    ) -> Result<Decimal> {
        let params = self.params(ctx)?;
        let bonded = self.total_bonded_tokens(ctx)?;
        let tokens = validator
            .tokens
            .checked_add(amount)
            .filter(|_| bonded.checked_add(amount).map_or(false, |t| t <= MAX_TOTAL_POWER))
            .ok_or(ModuleError::PowerOverflow { max: MAX_TOTAL_POWER })?;
        self.bank
            .subtract_coins(ctx, delegator, &Coins::single(&params.bond_denom, amount))?;

        let shares = validator.shares_for(amount)?;
        validator.tokens = tokens;
        validator.delegator_shares = (validator.delegator_shares + shares).normalize();

        let mut delegation = self
            .get_delegation(ctx, delegator, &validator.operator)?
            .unwrap_or(Delegation {
                delegator: *delegator,
                validator: validator.operator,
                shares: Decimal::ZERO,
            });
        delegation.shares = (delegation.shares + shares).normalize();

        self.set_validator(ctx, validator)?;
        self.set_delegation(ctx, &delegation)?;
        Ok(shares)
    }

    /// Remove `shares` and pay the tokens back immediately
    pub fn unbond(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        shares: Decimal,
    ) -> Result<u64> {
        let mut delegation = self
            .get_delegation(ctx, delegator, operator)?
            .ok_or(ModuleError::DelegationNotFound)?;
        if shares > delegation.shares {
            return Err(ModuleError::InsufficientShares(format!(
                "have {}, unbonding {}",
                delegation.shares, shares
            )));
        }
        let mut validator = self
            .get_validator(ctx, operator)?
            .ok_or(ModuleError::ValidatorNotFound)?;

        let tokens = validator.tokens_for(shares)?;
        validator.tokens -= tokens.min(validator.tokens);
        validator.delegator_shares = (validator.delegator_shares - shares).normalize();
        delegation.shares = (delegation.shares - shares).normalize();

        self.set_validator(ctx, &validator)?;
        self.set_delegation(ctx, &delegation)?;

        if tokens > 0 {
            let params = self.params(ctx)?;
            self.bank
                .add_coins(ctx, delegator, &Coins::single(&params.bond_denom, tokens))?;
        }
        Ok(tokens)
    }

    /// Burn `fraction` of a validator's tokens; returns the amount burned
    pub fn slash(&self, ctx: &mut Context<'_>, cons_addr: &Address, fraction: Decimal) -> Result<u64> {
        let Some(mut validator) = self.get_validator_by_cons_addr(ctx, cons_addr)? else {
            tracing::warn!(cons_addr = %cons_addr, "Slash of unknown validator ignored");
            return Ok(0);
        };

        let burned = Decimal::from(validator.tokens)
            .checked_mul(fraction)
            .and_then(|v| v.floor().to_u64())
            .ok_or_else(decimal_overflow)?
            .min(validator.tokens);
        validator.tokens -= burned;
        self.set_validator(ctx, &validator)?;

        tracing::info!(
            validator = %validator.operator,
            burned,
            fraction = %fraction,
            "Validator slashed"
        );
        Ok(burned)
    }

    /// Remove a validator from the active set
    pub fn jail(&self, ctx: &mut Context<'_>, cons_addr: &Address) -> Result<()> {
        self.set_jailed(ctx, cons_addr, true)
    }

    /// Allow a validator back into the active set
    pub fn unjail(&self, ctx: &mut Context<'_>, cons_addr: &Address) -> Result<()> {
        self.set_jailed(ctx, cons_addr, false)
    }

    fn set_jailed(&self, ctx: &mut Context<'_>, cons_addr: &Address, jailed: bool) -> Result<()> {
        let mut validator = self
            .get_validator_by_cons_addr(ctx, cons_addr)?
            .ok_or(ModuleError::ValidatorNotFound)?;
        validator.jailed = jailed;
        self.set_validator(ctx, &validator)
    }

    /// Power of each validator in the last reported set, by operator
    pub fn last_validator_powers(&self, ctx: &Context<'_>) -> Result<BTreeMap<Address, u64>> {
        let mut powers = BTreeMap::new();
        for (key, value) in ctx.prefix_iter(&self.key, LAST_VALIDATOR_PREFIX)? {
            let operator = Address::from_bytes(
                key[LAST_VALIDATOR_PREFIX.len()..]
                    .try_into()
                    .map_err(|_| ModuleError::Internal("corrupt validator set key".to_string()))?,
            );
            let last: LastValidator = bincode::deserialize(&value)?;
            powers.insert(operator, last.power);
        }
        Ok(powers)
    }

    /// Sum of the last reported powers
    pub fn total_bonded_power(&self, ctx: &Context<'_>) -> Result<u64> {
        Ok(self.last_validator_powers(ctx)?.values().sum())
    }

    /// Tokens bonded to every validator, jailed ones included
    pub fn total_bonded_tokens(&self, ctx: &Context<'_>) -> Result<u64> {
        self.iterate_validators(ctx)?
            .iter()
            .try_fold(0u64, |total, v| total.checked_add(v.tokens))
            .ok_or(ModuleError::PowerOverflow { max: MAX_TOTAL_POWER })
    }

    /// Voting weight of one delegation (zero unless its validator is bonded)
    pub fn delegation_power(&self, ctx: &Context<'_>, delegation: &Delegation) -> Result<Decimal> {
        if !ctx.has(&self.key, &last_validator_key(&delegation.validator))? {
            return Ok(Decimal::ZERO);
        }
        match self.get_validator(ctx, &delegation.validator)? {
            Some(validator) if !validator.jailed => validator.token_value(delegation.shares),
            _ => Ok(Decimal::ZERO),
        }
    }

    /// Recompute the active set, persist it and return the changes
    pub fn apply_and_return_validator_set_updates(
        &self,
        ctx: &mut Context<'_>,
    ) -> Result<Vec<ValidatorUpdate>> {
        let params = self.params(ctx)?;

        let mut candidates: Vec<Validator> = self
            .iterate_validators(ctx)?
            .into_iter()
            .filter(|v| v.power() > 0)
            .collect();
        candidates.sort_by(|a, b| {
            b.power()
                .cmp(&a.power())
                .then_with(|| a.operator.cmp(&b.operator))
        });
        candidates.truncate(params.max_validators as usize);

        let last: BTreeMap<Address, LastValidator> = ctx
            .prefix_iter(&self.key, LAST_VALIDATOR_PREFIX)?
            .into_iter()
            .map(|(key, value)| {
                let operator: [u8; 20] = key[LAST_VALIDATOR_PREFIX.len()..]
                    .try_into()
                    .map_err(|_| ModuleError::Internal("corrupt validator set key".to_string()))?;
                Ok((Address::from_bytes(operator), bincode::deserialize(&value)?))
            })
            .collect::<Result<_>>()?;

        let mut updates = Vec::new();
        let mut active = BTreeSet::new();
        for validator in &candidates {
            active.insert(validator.operator);
            let power = validator.power();
            if last.get(&validator.operator).map(|l| l.power) != Some(power) {
                updates.push(ValidatorUpdate {
                    pub_key: validator.cons_pub_key,
                    power,
                });
            }
            ctx.set(
                &self.key,
                &last_validator_key(&validator.operator),
                &LastValidator {
                    pub_key: validator.cons_pub_key,
                    power,
                },
            )?;
        }

        for (operator, entry) in &last {
            if !active.contains(operator) {
                updates.push(ValidatorUpdate {
                    pub_key: entry.pub_key,
                    power: 0,
                });
                ctx.delete(&self.key, &last_validator_key(operator))?;
            }
        }

        if !updates.is_empty() {
            tracing::info!(
                height = ctx.height(),
                updates = updates.len(),
                active = candidates.len(),
                "Validator set changed"
            );
        }
        Ok(updates)
    }

    /// End-block hook
    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> Result<Vec<ValidatorUpdate>> {
        self.apply_and_return_validator_set_updates(ctx)
    }

    /// Load the stake section of a genesis document
    pub fn init_genesis(
        &self,
        ctx: &mut Context<'_>,
        genesis: &StakeGenesis,
    ) -> Result<Vec<ValidatorUpdate>> {
        if genesis.params.bond_denom.is_empty() {
            return Err(ModuleError::InvalidMsg("empty bond denom".to_string()));
        }
        self.set_params(ctx, &genesis.params)?;

        let mut operators = BTreeSet::new();
        let mut cons_keys = BTreeSet::new();
        let mut bonded: u64 = 0;
        for validator in &genesis.validators {
            bonded = bonded
                .checked_add(validator.tokens)
                .filter(|t| *t <= MAX_TOTAL_POWER)
                .ok_or(ModuleError::PowerOverflow { max: MAX_TOTAL_POWER })?;
            if !operators.insert(validator.operator) || !cons_keys.insert(validator.cons_pub_key) {
                return Err(ModuleError::ValidatorExists);
            }
            if validator.tokens > 0 && validator.delegator_shares.is_zero() {
                return Err(ModuleError::InvalidMsg(format!(
                    "validator {} has tokens but no shares",
                    validator.operator
                )));
            }
            self.set_validator(ctx, validator)?;
        }

        let mut shares_by_validator: BTreeMap<Address, Decimal> = BTreeMap::new();
        for delegation in &genesis.delegations {
            if !operators.contains(&delegation.validator) {
                return Err(ModuleError::ValidatorNotFound);
            }
            if delegation.shares <= Decimal::ZERO {
                return Err(ModuleError::InsufficientShares(delegation.shares.to_string()));
            }
            *shares_by_validator.entry(delegation.validator).or_default() += delegation.shares;
            self.set_delegation(ctx, delegation)?;
        }

        for validator in &genesis.validators {
            let delegated = shares_by_validator
                .get(&validator.operator)
                .copied()
                .unwrap_or_default();
            if delegated != validator.delegator_shares {
                return Err(ModuleError::InsufficientShares(format!(
                    "validator {} issued {} shares, delegations hold {}",
                    validator.operator, validator.delegator_shares, delegated
                )));
            }
        }

        self.apply_and_return_validator_set_updates(ctx)
    }

    /// Stake section of an exported genesis document
    pub fn export_genesis(&self, ctx: &Context<'_>) -> Result<StakeGenesis> {
        Ok(StakeGenesis {
            params: self.params(ctx)?,
            validators: self.iterate_validators(ctx)?,
            delegations: self.iterate_delegations(ctx)?,
        })
    }

    /// Active validator set, for the exported document
    pub fn write_validators(&self, ctx: &Context<'_>) -> Result<Vec<GenesisValidator>> {
        let mut out = Vec::new();
        for (operator, power) in self.last_validator_powers(ctx)? {
            let validator = self
                .get_validator(ctx, &operator)?
                .ok_or(ModuleError::ValidatorNotFound)?;
            out.push(GenesisValidator {
                pub_key: validator.cons_pub_key,
                power,
                name: validator.moniker,
            });
        }
        Ok(out)
    }
}

fn validate_bond(coin: &Coin) -> Result<()> {
    if coin.amount == 0 || coin.denom.is_empty() {
        return Err(ModuleError::InvalidCoins(coin.to_string()));
    }
    Ok(())
}

/// Register a new validator with a self-delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateValidator {
    /// Operator (signer)
    pub operator: Address,
    /// Consensus key
    pub cons_pub_key: PublicKey,
    /// Display name
    pub moniker: String,
    /// Initial self-bond
    pub self_delegation: Coin,
}

impl Message for MsgCreateValidator {
    const KIND: &'static str = "stake/create_validator";

    fn signers(&self) -> Vec<Address> {
        vec![self.operator]
    }

    fn validate_basic(&self) -> Result<()> {
        if self.moniker.is_empty() || self.moniker.len() > MAX_MONIKER_LEN {
            return Err(ModuleError::InvalidMsg(format!(
                "moniker must be 1..={} characters",
                MAX_MONIKER_LEN
            )));
        }
        validate_bond(&self.self_delegation)
    }
}

/// Bond tokens to a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegate {
    /// Delegator (signer)
    pub delegator: Address,
    /// Validator operator
    pub validator: Address,
    /// Amount to bond
    pub amount: Coin,
}

impl Message for MsgDelegate {
    const KIND: &'static str = "stake/delegate";

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<()> {
        validate_bond(&self.amount)
    }
}

/// Withdraw shares from a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnbond {
    /// Delegator (signer)
    pub delegator: Address,
    /// Validator operator
    pub validator: Address,
    /// Shares to withdraw
    pub shares: Decimal,
}

impl Message for MsgUnbond {
    const KIND: &'static str = "stake/unbond";

    fn signers(&self) -> Vec<Address> {
        vec![self.delegator]
    }

    fn validate_basic(&self) -> Result<()> {
        if self.shares <= Decimal::ZERO {
            return Err(ModuleError::InsufficientShares(self.shares.to_string()));
        }
        Ok(())
    }
}

/// Router entry for `stake`
#[derive(Debug, Clone)]
pub struct StakeHandler {
    keeper: StakeKeeper,
}

impl StakeHandler {
    /// Create handler
    pub fn new(keeper: StakeKeeper) -> Self {
        Self { keeper }
    }

    fn check_denom(&self, ctx: &Context<'_>, coin: &Coin) -> Result<()> {
        let params = self.keeper.params(ctx)?;
        if coin.denom != params.bond_denom {
            return Err(ModuleError::BadDenom {
                expected: params.bond_denom,
                got: coin.denom.clone(),
            });
        }
        Ok(())
    }

    fn handle_create_validator(&self, ctx: &mut Context<'_>, msg: &MsgCreateValidator) -> Result<Tags> {
        self.check_denom(ctx, &msg.self_delegation)?;
        if self.keeper.get_validator(ctx, &msg.operator)?.is_some()
            || self
                .keeper
                .get_validator_by_cons_addr(ctx, &msg.cons_pub_key.address())?
                .is_some()
        {
            return Err(ModuleError::ValidatorExists);
        }

        let mut validator = Validator::new(msg.operator, msg.cons_pub_key, msg.moniker.clone());
        self.keeper
            .delegate(ctx, &msg.operator, &mut validator, msg.self_delegation.amount)?;

        Ok(vec![
            Tag::new("action", "create_validator"),
            Tag::new("validator", msg.operator.to_hex()),
            Tag::new("moniker", msg.moniker.clone()),
        ])
    }

    fn handle_delegate(&self, ctx: &mut Context<'_>, msg: &MsgDelegate) -> Result<Tags> {
        self.check_denom(ctx, &msg.amount)?;
        let mut validator = self
            .keeper
            .get_validator(ctx, &msg.validator)?
            .ok_or(ModuleError::ValidatorNotFound)?;
        let shares = self
            .keeper
            .delegate(ctx, &msg.delegator, &mut validator, msg.amount.amount)?;

        Ok(vec![
            Tag::new("action", "delegate"),
            Tag::new("delegator", msg.delegator.to_hex()),
            Tag::new("validator", msg.validator.to_hex()),
            Tag::new("shares", shares.to_string()),
        ])
    }

    fn handle_unbond(&self, ctx: &mut Context<'_>, msg: &MsgUnbond) -> Result<Tags> {
        let tokens = self
            .keeper
            .unbond(ctx, &msg.delegator, &msg.validator, msg.shares)?;

        Ok(vec![
            Tag::new("action", "unbond"),
            Tag::new("delegator", msg.delegator.to_hex()),
            Tag::new("validator", msg.validator.to_hex()),
            Tag::new("tokens", tokens.to_string()),
        ])
    }
}

impl Handler for StakeHandler {
    fn route(&self) -> &'static str {
        "stake"
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags> {
        match msg {
            Msg::CreateValidator(msg) => self.handle_create_validator(ctx, msg),
            Msg::Delegate(msg) => self.handle_delegate(ctx, msg),
            Msg::Unbond(msg) => self.handle_unbond(ctx, msg),
            other => Err(unrecognized(self, other)),
        }
    }
}
