//! Misbehaviour and downtime penalties
//!
//! The begin-block hook first processes double-sign evidence, then records
//! which validators signed the previous block. A validator that misses more
//! than the allowed share of a sliding window is slashed and jailed; a
//! double signer is slashed, jailed and tombstoned.
//!
//! # Keys (`slashing` partition)
//!
//! - `params` → [`SlashingParams`]
//! - `0x01 ‖ consensus address` → [`SigningInfo`]
//! - `0x02 ‖ consensus address ‖ index` → missed-block marker

use crate::{
    error::{ModuleError, Result},
    msg::{unrecognized, Message, Msg},
    stake::StakeKeeper,
    Handler,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thorchain_core::{Address, Context, StoreKey, Tag, Tags};

const PARAMS_KEY: &[u8] = b"params";
const SIGNING_INFO_PREFIX: &[u8] = &[0x01];
const MISSED_BLOCK_PREFIX: &[u8] = &[0x02];

fn signing_info_key(cons_addr: &Address) -> Vec<u8> {
    [SIGNING_INFO_PREFIX, cons_addr.as_bytes()].concat()
}

fn missed_block_key(cons_addr: &Address, index: u64) -> Vec<u8> {
    [MISSED_BLOCK_PREFIX, cons_addr.as_bytes(), &index.to_be_bytes()].concat()
}

/// Slashing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Evidence older than this (seconds) is ignored
    pub max_evidence_age_secs: i64,
    /// Liveness window in blocks
    pub signed_blocks_window: u64,
    /// Share of the window a validator must sign
    pub min_signed_per_window: Decimal,
    /// Jail time after downtime (seconds)
    pub downtime_jail_duration_secs: i64,
    /// Share of tokens burned for double signing
    pub slash_fraction_double_sign: Decimal,
    /// Share of tokens burned for downtime
    pub slash_fraction_downtime: Decimal,
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            max_evidence_age_secs: 60 * 2 * 60,
            signed_blocks_window: 100,
            min_signed_per_window: Decimal::new(5, 1),
            downtime_jail_duration_secs: 60 * 10,
            slash_fraction_double_sign: Decimal::new(5, 2),
            slash_fraction_downtime: Decimal::new(1, 2),
        }
    }
}

impl SlashingParams {
    /// Misses tolerated within one window
    pub fn max_missed_blocks(&self) -> u64 {
        let min_signed = (Decimal::from(self.signed_blocks_window) * self.min_signed_per_window)
            .floor()
            .to_u64()
            .unwrap_or(self.signed_blocks_window);
        self.signed_blocks_window.saturating_sub(min_signed)
    }
}

/// Liveness record of one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfo {
    /// Height of the first observed vote
    pub start_height: u64,
    /// Votes observed so far (position in the window)
    pub index_offset: u64,
    /// Misses within the current window
    pub missed_blocks_counter: u64,
    /// Earliest time the validator may unjail
    pub jailed_until: DateTime<Utc>,
    /// Permanently barred after double signing
    pub tombstoned: bool,
}

/// Vote of one validator on the previous block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    /// Consensus address
    pub validator: Address,
    /// Voting power at that block
    pub power: u64,
    /// Whether a signature was included
    pub signed_last_block: bool,
}

/// Double-sign evidence reported by consensus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Consensus address of the offender
    pub validator: Address,
    /// Height of the infraction
    pub height: u64,
    /// Time of the infraction
    pub time: DateTime<Utc>,
    /// Power at the infraction
    pub power: u64,
}

/// Slashing state manager
#[derive(Debug, Clone)]
pub struct SlashingKeeper {
    key: StoreKey,
    stake: StakeKeeper,
}

impl SlashingKeeper {
    /// Create new keeper bound to its partition and the stake keeper
    pub fn new(key: StoreKey, stake: StakeKeeper) -> Self {
        Self { key, stake }
    }

    /// Current parameters
    pub fn params(&self, ctx: &Context<'_>) -> Result<SlashingParams> {
        Ok(ctx.get(&self.key, PARAMS_KEY)?.unwrap_or_default())
    }

    /// Replace parameters
    pub fn set_params(&self, ctx: &mut Context<'_>, params: &SlashingParams) -> Result<()> {
        ctx.set(&self.key, PARAMS_KEY, params)?;
        Ok(())
    }

    /// Signing record of a validator
    pub fn get_signing_info(&self, ctx: &Context<'_>, cons_addr: &Address) -> Result<Option<SigningInfo>> {
        Ok(ctx.get(&self.key, &signing_info_key(cons_addr))?)
    }

    fn set_signing_info(&self, ctx: &mut Context<'_>, cons_addr: &Address, info: &SigningInfo) -> Result<()> {
        ctx.set(&self.key, &signing_info_key(cons_addr), info)?;
        Ok(())
    }

    fn new_signing_info(ctx: &Context<'_>) -> SigningInfo {
        SigningInfo {
            start_height: ctx.height(),
            index_offset: 0,
            missed_blocks_counter: 0,
            jailed_until: ctx.block_time(),
            tombstoned: false,
        }
    }

    fn clear_missed_blocks(&self, ctx: &mut Context<'_>, cons_addr: &Address) -> Result<()> {
        let prefix = [MISSED_BLOCK_PREFIX, cons_addr.as_bytes()].concat();
        for (key, _) in ctx.prefix_iter(&self.key, &prefix)? {
            ctx.delete(&self.key, &key)?;
        }
        Ok(())
    }

    /// Slash, jail and tombstone a double signer
    pub fn handle_double_sign(&self, ctx: &mut Context<'_>, evidence: &Evidence) -> Result<Tags> {
        let params = self.params(ctx)?;
        let age = ctx.block_time() - evidence.time;
        if age > Duration::seconds(params.max_evidence_age_secs) {
            tracing::info!(
                validator = %evidence.validator,
                height = evidence.height,
                "Ignoring outdated double-sign evidence"
            );
            return Ok(Vec::new());
        }

        let Some(validator) = self.stake.get_validator_by_cons_addr(ctx, &evidence.validator)? else {
            return Ok(Vec::new());
        };
        let mut info = self
            .get_signing_info(ctx, &evidence.validator)?
            .unwrap_or_else(|| Self::new_signing_info(ctx));
        if info.tombstoned {
            return Ok(Vec::new());
        }

        let burned = self
            .stake
            .slash(ctx, &evidence.validator, params.slash_fraction_double_sign)?;
        if !validator.jailed {
            self.stake.jail(ctx, &evidence.validator)?;
        }
        info.tombstoned = true;
        self.set_signing_info(ctx, &evidence.validator, &info)?;

        tracing::warn!(
            validator = %validator.operator,
            height = evidence.height,
            burned,
            "Double sign: validator slashed and tombstoned"
        );
        Ok(vec![
            Tag::new("action", "double_sign"),
            Tag::new("validator", validator.operator.to_hex()),
            Tag::new("burned", burned.to_string()),
        ])
    }

    /// Record one vote and punish validators that are offline too long
    pub fn handle_validator_signature(
        &self,
        ctx: &mut Context<'_>,
        cons_addr: &Address,
        signed: bool,
    ) -> Result<Tags> {
        let params = self.params(ctx)?;
        let window = params.signed_blocks_window.max(1);
        let mut info = self
            .get_signing_info(ctx, cons_addr)?
            .unwrap_or_else(|| Self::new_signing_info(ctx));

        let index = info.index_offset % window;
        info.index_offset += 1;

        let key = missed_block_key(cons_addr, index);
        let previously_missed = ctx.has(&self.key, &key)?;
        match (previously_missed, !signed) {
            (false, true) => {
                ctx.set(&self.key, &key, &true)?;
                info.missed_blocks_counter += 1;
            }
            (true, false) => {
                ctx.delete(&self.key, &key)?;
                info.missed_blocks_counter = info.missed_blocks_counter.saturating_sub(1);
            }
            _ => {}
        }

        let mut tags = Vec::new();
        let min_height = info.start_height + window;
        if ctx.height() > min_height && info.missed_blocks_counter > params.max_missed_blocks() {
            if let Some(validator) = self.stake.get_validator_by_cons_addr(ctx, cons_addr)? {
                if !validator.jailed {
                    let burned = self
                        .stake
                        .slash(ctx, cons_addr, params.slash_fraction_downtime)?;
                    self.stake.jail(ctx, cons_addr)?;

                    info.jailed_until =
                        ctx.block_time() + Duration::seconds(params.downtime_jail_duration_secs);
                    info.missed_blocks_counter = 0;
                    info.index_offset = 0;
                    self.clear_missed_blocks(ctx, cons_addr)?;

                    tracing::warn!(
                        validator = %validator.operator,
                        height = ctx.height(),
                        burned,
                        "Downtime: validator slashed and jailed"
                    );
                    tags.push(Tag::new("action", "downtime"));
                    tags.push(Tag::new("validator", validator.operator.to_hex()));
                }
            }
        }

        self.set_signing_info(ctx, cons_addr, &info)?;
        Ok(tags)
    }

    /// Begin-block hook: evidence first, then liveness
    pub fn begin_blocker(
        &self,
        ctx: &mut Context<'_>,
        votes: &[VoteInfo],
        evidence: &[Evidence],
    ) -> Result<Tags> {
        let mut tags = Vec::new();
        for ev in evidence {
            tags.extend(self.handle_double_sign(ctx, ev)?);
        }
        for vote in votes {
            tags.extend(self.handle_validator_signature(ctx, &vote.validator, vote.signed_last_block)?);
        }
        Ok(tags)
    }
}

/// Return a jailed validator to the candidate pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnjail {
    /// Validator operator (signer)
    pub operator: Address,
}

impl Message for MsgUnjail {
    const KIND: &'static str = "slashing/unjail";

    fn signers(&self) -> Vec<Address> {
        vec![self.operator]
    }

    fn validate_basic(&self) -> Result<()> {
        Ok(())
    }
}

/// Router entry for `slashing`
#[derive(Debug, Clone)]
pub struct SlashingHandler {
    keeper: SlashingKeeper,
}

impl SlashingHandler {
    /// Create handler
    pub fn new(keeper: SlashingKeeper) -> Self {
        Self { keeper }
    }

    fn handle_unjail(&self, ctx: &mut Context<'_>, msg: &MsgUnjail) -> Result<Tags> {
        let validator = self
            .keeper
            .stake
            .get_validator(ctx, &msg.operator)?
            .ok_or(ModuleError::ValidatorNotFound)?;
        if !validator.jailed {
            return Err(ModuleError::ValidatorNotJailed);
        }

        let cons_addr = validator.cons_address();
        if let Some(info) = self.keeper.get_signing_info(ctx, &cons_addr)? {
            if info.tombstoned {
                return Err(ModuleError::ValidatorTombstoned);
            }
            if ctx.block_time() < info.jailed_until {
                return Err(ModuleError::ValidatorJailed);
            }
        }

        self.keeper.stake.unjail(ctx, &cons_addr)?;
        Ok(vec![
            Tag::new("action", "unjail"),
            Tag::new("validator", msg.operator.to_hex()),
        ])
    }
}

impl Handler for SlashingHandler {
    fn route(&self) -> &'static str {
        "slashing"
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags> {
        match msg {
            Msg::Unjail(msg) => self.handle_unjail(ctx, msg),
            other => Err(unrecognized(self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::AccountKeeper,
        bank::BankKeeper,
        stake::{StakeHandler, MsgCreateValidator},
    };
    use chrono::TimeZone;
    use thorchain_core::{crypto::KeyPair, BlockHeader, Coin, Coins, MemStore};

    struct Fixture {
        stake: StakeKeeper,
        slashing: SlashingKeeper,
        operator: Address,
        cons_addr: Address,
    }

    fn header(height: u64, secs: i64) -> BlockHeader {
        BlockHeader {
            chain_id: "test".to_string(),
            height,
            time: Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap(),
            proposer: None,
        }
    }

    fn setup(store: &mut MemStore) -> Fixture {
        let bank = BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")));
        let stake = StakeKeeper::new(StoreKey::new("stake"), bank.clone());
        let slashing = SlashingKeeper::new(StoreKey::new("slashing"), stake.clone());
        let operator = Address::from_bytes([1; 20]);
        let key = KeyPair::from_seed(&[1; 32]).public_key();

        let mut ctx = Context::new(store, header(1, 0));
        slashing
            .set_params(
                &mut ctx,
                &SlashingParams {
                    signed_blocks_window: 10,
                    ..SlashingParams::default()
                },
            )
            .unwrap();
        bank.add_coins(&mut ctx, &operator, &Coins::single("RUNE", 1_000)).unwrap();
        StakeHandler::new(stake.clone())
            .handle(
                &mut ctx,
                &MsgCreateValidator {
                    operator,
                    cons_pub_key: key,
                    moniker: "v".to_string(),
                    self_delegation: Coin::new("RUNE", 1_000),
                }
                .into(),
            )
            .unwrap();

        Fixture {
            stake,
            slashing,
            operator,
            cons_addr: key.address(),
        }
    }

    #[test]
    fn test_max_missed_blocks() {
        let params = SlashingParams {
            signed_blocks_window: 10,
            ..SlashingParams::default()
        };
        assert_eq!(params.max_missed_blocks(), 5);
    }

    #[test]
    fn test_double_sign_slashes_and_tombstones() {
        let mut store = MemStore::new();
        let f = setup(&mut store);
        let mut ctx = Context::new(&mut store, header(5, 50));

        let evidence = Evidence {
            validator: f.cons_addr,
            height: 4,
            time: Utc.timestamp_opt(1_600_000_040, 0).unwrap(),
            power: 1_000,
        };
        let tags = f.slashing.begin_blocker(&mut ctx, &[], &[evidence]).unwrap();
        assert_eq!(tags[0].value, "double_sign");

        let validator = f.stake.get_validator(&ctx, &f.operator).unwrap().unwrap();
        assert!(validator.jailed);
        assert_eq!(validator.tokens, 950);

        let handler = SlashingHandler::new(f.slashing.clone());
        let err = handler
            .handle(&mut ctx, &MsgUnjail { operator: f.operator }.into())
            .unwrap_err();
        assert!(matches!(err, ModuleError::ValidatorTombstoned));
    }

    #[test]
    fn test_old_evidence_ignored() {
        let mut store = MemStore::new();
        let f = setup(&mut store);
        let mut ctx = Context::new(&mut store, header(5, 100_000));

        let evidence = Evidence {
            validator: f.cons_addr,
            height: 1,
            time: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            power: 1_000,
        };
        assert!(f.slashing.begin_blocker(&mut ctx, &[], &[evidence]).unwrap().is_empty());
        assert!(!f.stake.get_validator(&ctx, &f.operator).unwrap().unwrap().jailed);
    }

    #[test]
    fn test_downtime_jails_then_unjail_after_period() {
        let mut store = MemStore::new();
        let f = setup(&mut store);

        let vote = VoteInfo {
            validator: f.cons_addr,
            power: 1_000,
            signed_last_block: false,
        };
        let mut jailed_at = None;
        for height in 2..30u64 {
            let mut ctx = Context::new(&mut store, header(height, height as i64 * 5));
            let tags = f.slashing.begin_blocker(&mut ctx, &[vote.clone()], &[]).unwrap();
            if !tags.is_empty() {
                jailed_at = Some(height);
                break;
            }
        }
        // start 2, window 10: first check after height 12 with 6+ misses
        assert_eq!(jailed_at, Some(13));

        let handler = SlashingHandler::new(f.slashing.clone());
        let mut ctx = Context::new(&mut store, header(14, 70));
        let err = handler
            .handle(&mut ctx, &MsgUnjail { operator: f.operator }.into())
            .unwrap_err();
        assert!(matches!(err, ModuleError::ValidatorJailed));

        let mut ctx = Context::new(&mut store, header(200, 13 * 5 + 600));
        handler
            .handle(&mut ctx, &MsgUnjail { operator: f.operator }.into())
            .unwrap();
        let validator = f.stake.get_validator(&ctx, &f.operator).unwrap().unwrap();
        assert!(!validator.jailed);
        assert_eq!(validator.tokens, 990);
    }

    #[test]
    fn test_unjail_not_jailed() {
        let mut store = MemStore::new();
        let f = setup(&mut store);
        let mut ctx = Context::new(&mut store, header(2, 10));
        let err = SlashingHandler::new(f.slashing)
            .handle(&mut ctx, &MsgUnjail { operator: f.operator }.into())
            .unwrap_err();
        assert!(matches!(err, ModuleError::ValidatorNotJailed));
    }
}
