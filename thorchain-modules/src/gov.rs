//! On-chain governance
//!
//! Proposals collect deposits until the minimum is reached, then enter a
//! voting period. The end-block hook drops proposals whose deposit period
//! ran out (burning their deposits) and tallies proposals whose voting period
//! ended, weighting each vote by the voter's bonded delegations.
//!
//! # Keys (`gov` partition)
//!
//! - `params`, `next_proposal_id`, `upgrade_plan`
//! - `0x00 ‖ id` → [`Proposal`]
//! - `0x10 ‖ id ‖ depositor` → [`Deposit`]
//! - `0x20 ‖ id ‖ voter` → [`VoteOption`]
//! - `0x30 ‖ end time ‖ id` → inactive (deposit period) queue
//! - `0x31 ‖ end time ‖ id` → active (voting period) queue

use crate::{
    bank::BankKeeper,
    error::{ModuleError, Result},
    msg::{unrecognized, Message, Msg},
    stake::StakeKeeper,
    Handler,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thorchain_core::{Address, Coins, Context, StoreKey, Tag, Tags};

const PARAMS_KEY: &[u8] = b"params";
const NEXT_PROPOSAL_ID_KEY: &[u8] = b"next_proposal_id";
const UPGRADE_PLAN_KEY: &[u8] = b"upgrade_plan";
const PROPOSAL_PREFIX: &[u8] = &[0x00];
const DEPOSIT_PREFIX: &[u8] = &[0x10];
const VOTE_PREFIX: &[u8] = &[0x20];
const INACTIVE_QUEUE_PREFIX: &[u8] = &[0x30];
const ACTIVE_QUEUE_PREFIX: &[u8] = &[0x31];

const MAX_TITLE_LEN: usize = 140;
const MAX_DESCRIPTION_LEN: usize = 5000;

fn proposal_key(id: u64) -> Vec<u8> {
    [PROPOSAL_PREFIX, &id.to_be_bytes()].concat()
}

fn deposits_prefix(id: u64) -> Vec<u8> {
    [DEPOSIT_PREFIX, &id.to_be_bytes()].concat()
}

fn deposit_key(id: u64, depositor: &Address) -> Vec<u8> {
    [deposits_prefix(id).as_slice(), depositor.as_bytes()].concat()
}

fn votes_prefix(id: u64) -> Vec<u8> {
    [VOTE_PREFIX, &id.to_be_bytes()].concat()
}

fn vote_key(id: u64, voter: &Address) -> Vec<u8> {
    [votes_prefix(id).as_slice(), voter.as_bytes()].concat()
}

/// Queue keys sort by end time; pre-epoch times clamp to zero
fn queue_key(prefix: &[u8], end: DateTime<Utc>, id: u64) -> Vec<u8> {
    let secs = end.timestamp().max(0) as u64;
    [prefix, &secs.to_be_bytes(), &id.to_be_bytes()].concat()
}

fn queue_entry(prefix: &[u8], key: &[u8]) -> Result<(u64, u64)> {
    let rest = &key[prefix.len()..];
    if rest.len() != 16 {
        return Err(ModuleError::Internal("corrupt proposal queue key".to_string()));
    }
    let mut secs = [0u8; 8];
    let mut id = [0u8; 8];
    secs.copy_from_slice(&rest[..8]);
    id.copy_from_slice(&rest[8..]);
    Ok((u64::from_be_bytes(secs), u64::from_be_bytes(id)))
}

/// Governance parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovParams {
    /// Deposit needed to start voting
    pub min_deposit: Coins,
    /// Length of the deposit period (seconds)
    pub max_deposit_period_secs: i64,
    /// Length of the voting period (seconds)
    pub voting_period_secs: i64,
    /// Share of bonded power that must vote
    pub quorum: Decimal,
    /// Share of non-abstaining votes needed to pass
    pub threshold: Decimal,
    /// Share of veto votes that rejects and burns deposits
    pub veto: Decimal,
}

impl Default for GovParams {
    fn default() -> Self {
        Self {
            min_deposit: Coins::single("RUNE", 10),
            max_deposit_period_secs: 60 * 60 * 24 * 2,
            voting_period_secs: 60 * 60 * 24 * 2,
            quorum: Decimal::new(334, 3),
            threshold: Decimal::new(5, 1),
            veto: Decimal::new(334, 3),
        }
    }
}

/// Governance genesis (not part of the exported document)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovGenesis {
    /// First proposal ID
    pub starting_proposal_id: u64,
    /// Parameters
    pub params: GovParams,
}

impl Default for GovGenesis {
    fn default() -> Self {
        Self {
            starting_proposal_id: 1,
            params: GovParams::default(),
        }
    }
}

/// What a proposal does when it passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalKind {
    /// Signalling only
    Text,
    /// Schedule a software upgrade
    SoftwareUpgrade {
        /// Upgrade name
        name: String,
        /// Height to halt at
        height: u64,
    },
}

/// Proposal lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Collecting deposits
    DepositPeriod,
    /// Collecting votes
    VotingPeriod,
    /// Tallied and accepted
    Passed,
    /// Tallied and refused
    Rejected,
}

/// Vote choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOption {
    /// In favour
    Yes,
    /// Counted for quorum only
    Abstain,
    /// Against
    No,
    /// Against, and burn the deposits
    NoWithVeto,
}

/// Voting power per option
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    /// Yes
    pub yes: Decimal,
    /// Abstain
    pub abstain: Decimal,
    /// No
    pub no: Decimal,
    /// No with veto
    pub no_with_veto: Decimal,
}

impl TallyResult {
    fn add(&mut self, option: VoteOption, power: Decimal) {
        let slot = match option {
            VoteOption::Yes => &mut self.yes,
            VoteOption::Abstain => &mut self.abstain,
            VoteOption::No => &mut self.no,
            VoteOption::NoWithVeto => &mut self.no_with_veto,
        };
        *slot += power;
    }

    fn total(&self) -> Decimal {
        self.yes + self.abstain + self.no + self.no_with_veto
    }
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// ID
    pub id: u64,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Effect on passing
    pub kind: ProposalKind,
    /// Stage
    pub status: ProposalStatus,
    /// Submission time
    pub submit_time: DateTime<Utc>,
    /// End of the deposit period
    pub deposit_end_time: DateTime<Utc>,
    /// Sum of deposits
    pub total_deposit: Coins,
    /// Start of voting
    pub voting_start_time: Option<DateTime<Utc>>,
    /// End of voting
    pub voting_end_time: Option<DateTime<Utc>>,
    /// Result, once tallied
    pub final_tally: Option<TallyResult>,
}

/// Coins escrowed by one depositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Depositor
    pub depositor: Address,
    /// Amount
    pub amount: Coins,
}

/// Upgrade scheduled by a passed proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePlan {
    /// Upgrade name
    pub name: String,
    /// Height to halt at
    pub height: u64,
    /// Proposal that scheduled it
    pub proposal_id: u64,
}

/// Governance state manager
#[derive(Debug, Clone)]
pub struct GovKeeper {
    key: StoreKey,
    bank: BankKeeper,
    stake: StakeKeeper,
}

impl GovKeeper {
    /// Create new keeper bound to its partition, the bank and stake keepers
    pub fn new(key: StoreKey, bank: BankKeeper, stake: StakeKeeper) -> Self {
        Self { key, bank, stake }
    }

    /// Current parameters
    pub fn params(&self, ctx: &Context<'_>) -> Result<GovParams> {
        Ok(ctx.get(&self.key, PARAMS_KEY)?.unwrap_or_default())
    }

    /// Load genesis
    pub fn init_genesis(&self, ctx: &mut Context<'_>, genesis: &GovGenesis) -> Result<()> {
        if !genesis.params.min_deposit.is_valid() {
            return Err(ModuleError::InvalidCoins(genesis.params.min_deposit.to_string()));
        }
        ctx.set(&self.key, PARAMS_KEY, &genesis.params)?;
        ctx.set(&self.key, NEXT_PROPOSAL_ID_KEY, &genesis.starting_proposal_id)?;
        Ok(())
    }

    /// Proposal by ID
    pub fn get_proposal(&self, ctx: &Context<'_>, id: u64) -> Result<Option<Proposal>> {
        Ok(ctx.get(&self.key, &proposal_key(id))?)
    }

    fn set_proposal(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> Result<()> {
        ctx.set(&self.key, &proposal_key(proposal.id), proposal)?;
        Ok(())
    }

    /// Scheduled upgrade, if any
    pub fn upgrade_plan(&self, ctx: &Context<'_>) -> Result<Option<UpgradePlan>> {
        Ok(ctx.get(&self.key, UPGRADE_PLAN_KEY)?)
    }

    /// Deposits on a proposal, in depositor order
    pub fn deposits(&self, ctx: &Context<'_>, id: u64) -> Result<Vec<Deposit>> {
        Ok(ctx.prefix_values(&self.key, &deposits_prefix(id))?)
    }

    /// Recorded vote
    pub fn get_vote(&self, ctx: &Context<'_>, id: u64, voter: &Address) -> Result<Option<VoteOption>> {
        Ok(ctx.get(&self.key, &vote_key(id, voter))?)
    }

    /// Create a proposal and escrow the initial deposit
    pub fn submit_proposal(&self, ctx: &mut Context<'_>, msg: &MsgSubmitProposal) -> Result<u64> {
        let params = self.params(ctx)?;
        let id = ctx
            .get::<u64>(&self.key, NEXT_PROPOSAL_ID_KEY)?
            .unwrap_or(1);
        ctx.set(&self.key, NEXT_PROPOSAL_ID_KEY, &(id + 1))?;

        let submit_time = ctx.block_time();
        let proposal = Proposal {
            id,
            title: msg.title.clone(),
            description: msg.description.clone(),
            kind: msg.kind.clone(),
            status: ProposalStatus::DepositPeriod,
            submit_time,
            deposit_end_time: submit_time + Duration::seconds(params.max_deposit_period_secs),
            total_deposit: Coins::empty(),
            voting_start_time: None,
            voting_end_time: None,
            final_tally: None,
        };
        self.set_proposal(ctx, &proposal)?;
        ctx.set(
            &self.key,
            &queue_key(INACTIVE_QUEUE_PREFIX, proposal.deposit_end_time, id),
            &id,
        )?;

        if !msg.initial_deposit.is_zero() {
            self.add_deposit(ctx, id, &msg.proposer, &msg.initial_deposit)?;
        }
        Ok(id)
    }

    /// Escrow a deposit; starts voting once the minimum is reached
    pub fn add_deposit(
        &self,
        ctx: &mut Context<'_>,
        id: u64,
        depositor: &Address,
        amount: &Coins,
    ) -> Result<bool> {
        let mut proposal = self
            .get_proposal(ctx, id)?
            .ok_or(ModuleError::UnknownProposal(id))?;
        if !matches!(
            proposal.status,
            ProposalStatus::DepositPeriod | ProposalStatus::VotingPeriod
        ) {
            return Err(ModuleError::InactiveProposal(id));
        }

        self.bank.subtract_coins(ctx, depositor, amount)?;

        let key = deposit_key(id, depositor);
        let mut deposit = ctx.get::<Deposit>(&self.key, &key)?.unwrap_or(Deposit {
            depositor: *depositor,
            amount: Coins::empty(),
        });
        deposit.amount = deposit.amount.checked_add(amount)?;
        ctx.set(&self.key, &key, &deposit)?;

        proposal.total_deposit = proposal.total_deposit.checked_add(amount)?;
        let params = self.params(ctx)?;
        let activated = proposal.status == ProposalStatus::DepositPeriod
            && proposal.total_deposit.is_all_gte(&params.min_deposit);
        if activated {
            ctx.delete(
                &self.key,
                &queue_key(INACTIVE_QUEUE_PREFIX, proposal.deposit_end_time, id),
            )?;
            let start = ctx.block_time();
            let end = start + Duration::seconds(params.voting_period_secs);
            proposal.status = ProposalStatus::VotingPeriod;
            proposal.voting_start_time = Some(start);
            proposal.voting_end_time = Some(end);
            ctx.set(&self.key, &queue_key(ACTIVE_QUEUE_PREFIX, end, id), &id)?;
        }
        self.set_proposal(ctx, &proposal)?;
        Ok(activated)
    }

    /// Record or replace a vote
    pub fn add_vote(&self, ctx: &mut Context<'_>, id: u64, voter: &Address, option: VoteOption) -> Result<()> {
        let proposal = self
            .get_proposal(ctx, id)?
            .ok_or(ModuleError::UnknownProposal(id))?;
        if proposal.status != ProposalStatus::VotingPeriod {
            return Err(ModuleError::InactiveProposal(id));
        }
        ctx.set(&self.key, &vote_key(id, voter), &option)?;
        Ok(())
    }

    fn settle_deposits(&self, ctx: &mut Context<'_>, id: u64, refund: bool) -> Result<()> {
        for (key, value) in ctx.prefix_iter(&self.key, &deposits_prefix(id))? {
            let deposit: Deposit = bincode::deserialize(&value)?;
            if refund {
                self.bank.add_coins(ctx, &deposit.depositor, &deposit.amount)?;
            }
            ctx.delete(&self.key, &key)?;
        }
        Ok(())
    }

    /// Tally votes: (passes, vetoed, result)
    pub fn tally(&self, ctx: &Context<'_>, proposal: &Proposal) -> Result<(bool, bool, TallyResult)> {
        let params = self.params(ctx)?;
        let mut result = TallyResult::default();

        for (key, value) in ctx.prefix_iter(&self.key, &votes_prefix(proposal.id))? {
            let voter_bytes: [u8; 20] = key[VOTE_PREFIX.len() + 8..]
                .try_into()
                .map_err(|_| ModuleError::Internal("corrupt vote key".to_string()))?;
            let voter = Address::from_bytes(voter_bytes);
            let option: VoteOption = bincode::deserialize(&value)?;

            let mut power = Decimal::ZERO;
            for delegation in self.stake.delegations_of(ctx, &voter)? {
                power += self.stake.delegation_power(ctx, &delegation)?;
            }
            result.add(option, power);
        }

        let total_bonded = Decimal::from(self.stake.total_bonded_power(ctx)?);
        if total_bonded.is_zero() {
            return Ok((false, false, result));
        }
        let voted = result.total();
        if voted / total_bonded < params.quorum {
            return Ok((false, false, result));
        }
        if voted == result.abstain {
            return Ok((false, false, result));
        }
        if result.no_with_veto / voted > params.veto {
            return Ok((false, true, result));
        }
        let passes = result.yes / (voted - result.abstain) > params.threshold;
        Ok((passes, false, result))
    }

    fn execute(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> Result<()> {
        match &proposal.kind {
            ProposalKind::Text => {}
            ProposalKind::SoftwareUpgrade { name, height } => {
                let plan = UpgradePlan {
                    name: name.clone(),
                    height: *height,
                    proposal_id: proposal.id,
                };
                tracing::info!(name = %plan.name, height = plan.height, "Software upgrade scheduled");
                ctx.set(&self.key, UPGRADE_PLAN_KEY, &plan)?;
            }
        }
        Ok(())
    }

    fn due_entries(&self, ctx: &Context<'_>, prefix: &[u8]) -> Result<Vec<(Vec<u8>, u64)>> {
        let now = ctx.block_time().timestamp().max(0) as u64;
        let mut due = Vec::new();
        for (key, _) in ctx.prefix_iter(&self.key, prefix)? {
            let (end, id) = queue_entry(prefix, &key)?;
            if end > now {
                break;
            }
            due.push((key, id));
        }
        Ok(due)
    }

    /// End-block hook
    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> Result<Tags> {
        let mut tags = Vec::new();

        for (key, id) in self.due_entries(ctx, INACTIVE_QUEUE_PREFIX)? {
            ctx.delete(&self.key, &key)?;
            self.settle_deposits(ctx, id, false)?;
            ctx.delete(&self.key, &proposal_key(id))?;
            tracing::info!(proposal = id, "Proposal dropped: deposit period ended");
            tags.push(Tag::new("proposal-dropped", id.to_string()));
        }

        for (key, id) in self.due_entries(ctx, ACTIVE_QUEUE_PREFIX)? {
            ctx.delete(&self.key, &key)?;
            let mut proposal = self
                .get_proposal(ctx, id)?
                .ok_or(ModuleError::UnknownProposal(id))?;

            let (passes, vetoed, result) = self.tally(ctx, &proposal)?;
            self.settle_deposits(ctx, id, !vetoed)?;
            if passes {
                self.execute(ctx, &proposal)?;
                proposal.status = ProposalStatus::Passed;
            } else {
                proposal.status = ProposalStatus::Rejected;
            }
            proposal.final_tally = Some(result);
            self.set_proposal(ctx, &proposal)?;

            let outcome = if passes { "passed" } else { "rejected" };
            tracing::info!(proposal = id, outcome, vetoed, "Proposal tallied");
            tags.push(Tag::new("proposal-id", id.to_string()));
            tags.push(Tag::new("proposal-result", outcome));
        }

        Ok(tags)
    }
}

/// Submit a proposal with an initial deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitProposal {
    /// Proposer (signer)
    pub proposer: Address,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Effect on passing
    pub kind: ProposalKind,
    /// Initial deposit
    pub initial_deposit: Coins,
}

impl Message for MsgSubmitProposal {
    const KIND: &'static str = "gov/submit_proposal";

    fn signers(&self) -> Vec<Address> {
        vec![self.proposer]
    }

    fn validate_basic(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.title.len() > MAX_TITLE_LEN {
            return Err(ModuleError::InvalidProposal(format!(
                "title must be 1..={} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(ModuleError::InvalidProposal(format!(
                "description longer than {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if let ProposalKind::SoftwareUpgrade { name, .. } = &self.kind {
            if name.is_empty() {
                return Err(ModuleError::InvalidProposal("empty upgrade name".to_string()));
            }
        }
        if !self.initial_deposit.is_valid() {
            return Err(ModuleError::InvalidCoins(self.initial_deposit.to_string()));
        }
        Ok(())
    }
}

/// Add to a proposal's deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDeposit {
    /// Proposal
    pub proposal_id: u64,
    /// Depositor (signer)
    pub depositor: Address,
    /// Amount
    pub amount: Coins,
}

impl Message for MsgDeposit {
    const KIND: &'static str = "gov/deposit";

    fn signers(&self) -> Vec<Address> {
        vec![self.depositor]
    }

    fn validate_basic(&self) -> Result<()> {
        if !self.amount.is_valid() || self.amount.is_zero() {
            return Err(ModuleError::InvalidCoins(self.amount.to_string()));
        }
        Ok(())
    }
}

/// Vote on a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVote {
    /// Proposal
    pub proposal_id: u64,
    /// Voter (signer)
    pub voter: Address,
    /// Choice
    pub option: VoteOption,
}

impl Message for MsgVote {
    const KIND: &'static str = "gov/vote";

    fn signers(&self) -> Vec<Address> {
        vec![self.voter]
    }

    fn validate_basic(&self) -> Result<()> {
        Ok(())
    }
}

/// Router entry for `gov`
#[derive(Debug, Clone)]
pub struct GovHandler {
    keeper: GovKeeper,
}

impl GovHandler {
    /// Create handler
    pub fn new(keeper: GovKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for GovHandler {
    fn route(&self) -> &'static str {
        "gov"
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags> {
        match msg {
            Msg::SubmitProposal(msg) => {
                let id = self.keeper.submit_proposal(ctx, msg)?;
                Ok(vec![
                    Tag::new("action", "submit_proposal"),
                    Tag::new("proposer", msg.proposer.to_hex()),
                    Tag::new("proposal-id", id.to_string()),
                ])
            }
            Msg::Deposit(msg) => {
                let activated = self
                    .keeper
                    .add_deposit(ctx, msg.proposal_id, &msg.depositor, &msg.amount)?;
                let mut tags = vec![
                    Tag::new("action", "deposit"),
                    Tag::new("depositor", msg.depositor.to_hex()),
                    Tag::new("proposal-id", msg.proposal_id.to_string()),
                ];
                if activated {
                    tags.push(Tag::new("voting-period-start", msg.proposal_id.to_string()));
                }
                Ok(tags)
            }
            Msg::Vote(msg) => {
                self.keeper
                    .add_vote(ctx, msg.proposal_id, &msg.voter, msg.option)?;
                Ok(vec![
                    Tag::new("action", "vote"),
                    Tag::new("voter", msg.voter.to_hex()),
                    Tag::new("proposal-id", msg.proposal_id.to_string()),
                ])
            }
            other => Err(unrecognized(self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::AccountKeeper,
        stake::{MsgCreateValidator, StakeHandler},
    };
    use chrono::TimeZone;
    use thorchain_core::{crypto::KeyPair, BlockHeader, Coin, MemStore};

    struct Fixture {
        bank: BankKeeper,
        stake: StakeKeeper,
        gov: GovKeeper,
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn header(secs: i64) -> BlockHeader {
        BlockHeader {
            chain_id: "test".to_string(),
            height: 1,
            time: Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap(),
            proposer: None,
        }
    }

    /// Two validators: 1 with 600 power, 2 with 400
    fn setup(store: &mut MemStore) -> Fixture {
        let bank = BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")));
        let stake = StakeKeeper::new(StoreKey::new("stake"), bank.clone());
        let gov = GovKeeper::new(StoreKey::new("gov"), bank.clone(), stake.clone());

        let mut ctx = Context::new(store, header(0));
        gov.init_genesis(&mut ctx, &GovGenesis::default()).unwrap();
        for (byte, amount) in [(1u8, 600u64), (2, 400)] {
            bank.add_coins(&mut ctx, &addr(byte), &Coins::single("RUNE", 1_000)).unwrap();
            StakeHandler::new(stake.clone())
                .handle(
                    &mut ctx,
                    &MsgCreateValidator {
                        operator: addr(byte),
                        cons_pub_key: KeyPair::from_seed(&[byte; 32]).public_key(),
                        moniker: format!("v{}", byte),
                        self_delegation: Coin::new("RUNE", amount),
                    }
                    .into(),
                )
                .unwrap();
        }
        stake.end_blocker(&mut ctx).unwrap();
        Fixture { bank, stake, gov }
    }

    fn submit(f: &Fixture, ctx: &mut Context<'_>, deposit: u64, kind: ProposalKind) -> u64 {
        let msg = MsgSubmitProposal {
            proposer: addr(1),
            title: "Upgrade".to_string(),
            description: "".to_string(),
            kind,
            initial_deposit: Coins::single("RUNE", deposit),
        };
        f.gov.submit_proposal(ctx, &msg).unwrap()
    }

    #[test]
    fn test_inactive_proposal_dropped_and_burned() {
        let mut store = MemStore::new();
        let f = setup(&mut store);

        let mut ctx = Context::new(&mut store, header(10));
        let id = submit(&f, &mut ctx, 5, ProposalKind::Text);
        assert_eq!(f.bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("RUNE"), 395);
        assert!(f.gov.end_blocker(&mut ctx).unwrap().is_empty());

        let mut ctx = Context::new(&mut store, header(10 + 60 * 60 * 24 * 2));
        let tags = f.gov.end_blocker(&mut ctx).unwrap();
        assert_eq!(tags[0].key, "proposal-dropped");
        assert!(f.gov.get_proposal(&ctx, id).unwrap().is_none());
        assert_eq!(f.bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("RUNE"), 395);
    }

    #[test]
    fn test_upgrade_proposal_passes() {
        let mut store = MemStore::new();
        let f = setup(&mut store);

        let mut ctx = Context::new(&mut store, header(10));
        let kind = ProposalKind::SoftwareUpgrade {
            name: "v2".to_string(),
            height: 1_000,
        };
        let id = submit(&f, &mut ctx, 10, kind);
        assert_eq!(
            f.gov.get_proposal(&ctx, id).unwrap().unwrap().status,
            ProposalStatus::VotingPeriod
        );
        f.gov.add_vote(&mut ctx, id, &addr(1), VoteOption::Yes).unwrap();
        f.gov.add_vote(&mut ctx, id, &addr(2), VoteOption::No).unwrap();

        let mut ctx = Context::new(&mut store, header(10 + 60 * 60 * 24 * 2));
        let tags = f.gov.end_blocker(&mut ctx).unwrap();
        assert!(tags.contains(&Tag::new("proposal-result", "passed")));

        let proposal = f.gov.get_proposal(&ctx, id).unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Passed);
        let tally = proposal.final_tally.unwrap();
        assert_eq!(tally.yes, Decimal::from(600u64));
        assert_eq!(tally.no, Decimal::from(400u64));

        assert_eq!(f.gov.upgrade_plan(&ctx).unwrap().unwrap().height, 1_000);
        // deposit refunded
        assert_eq!(f.bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("RUNE"), 400);
    }

    #[test]
    fn test_veto_burns_deposit() {
        let mut store = MemStore::new();
        let f = setup(&mut store);

        let mut ctx = Context::new(&mut store, header(10));
        let id = submit(&f, &mut ctx, 10, ProposalKind::Text);
        f.gov.add_vote(&mut ctx, id, &addr(1), VoteOption::Yes).unwrap();
        f.gov.add_vote(&mut ctx, id, &addr(2), VoteOption::NoWithVeto).unwrap();

        let mut ctx = Context::new(&mut store, header(10 + 60 * 60 * 24 * 2));
        f.gov.end_blocker(&mut ctx).unwrap();
        assert_eq!(
            f.gov.get_proposal(&ctx, id).unwrap().unwrap().status,
            ProposalStatus::Rejected
        );
        assert_eq!(f.bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("RUNE"), 390);
    }

    #[test]
    fn test_no_quorum_rejects_and_refunds() {
        let mut store = MemStore::new();
        let f = setup(&mut store);

        let mut ctx = Context::new(&mut store, header(10));
        let id = submit(&f, &mut ctx, 10, ProposalKind::Text);
        let (passes, vetoed, _) = f
            .gov
            .tally(&ctx, &f.gov.get_proposal(&ctx, id).unwrap().unwrap())
            .unwrap();
        assert!(!passes && !vetoed);
        assert_eq!(f.stake.total_bonded_power(&ctx).unwrap(), 1_000);

        let mut ctx = Context::new(&mut store, header(10 + 60 * 60 * 24 * 2));
        f.gov.end_blocker(&mut ctx).unwrap();
        assert_eq!(
            f.gov.get_proposal(&ctx, id).unwrap().unwrap().status,
            ProposalStatus::Rejected
        );
        assert_eq!(f.bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("RUNE"), 400);
    }

    #[test]
    fn test_vote_outside_voting_period() {
        let mut store = MemStore::new();
        let f = setup(&mut store);

        let mut ctx = Context::new(&mut store, header(10));
        let id = submit(&f, &mut ctx, 1, ProposalKind::Text);
        let err = f.gov.add_vote(&mut ctx, id, &addr(2), VoteOption::Yes).unwrap_err();
        assert!(matches!(err, ModuleError::InactiveProposal(_)));

        let err = f.gov.add_vote(&mut ctx, 99, &addr(2), VoteOption::Yes).unwrap_err();
        assert!(matches!(err, ModuleError::UnknownProposal(99)));
    }
}
