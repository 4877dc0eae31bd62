//! THORChain application modules
//!
//! Each module owns one store partition and exposes a keeper (state access
//! with explicit dependencies on other keepers) plus a [`Handler`] the
//! router dispatches its messages to.
//!
//! # Modules
//!
//! - **auth**: Accounts, sequences, account numbers
//! - **bank**: Balances and transfers
//! - **fee**: Collected transaction fees
//! - **ibc**: Cross-chain packet queues
//! - **stake**: Validators, delegations, validator set updates
//! - **slashing**: Liveness tracking and double-sign punishment
//! - **gov**: Proposals, deposits, votes, tallies
//! - **clp**: Continuous liquidity pools

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod auth;
pub mod bank;
pub mod clp;
pub mod error;
pub mod fee;
pub mod gov;
pub mod ibc;
pub mod msg;
pub mod slashing;
pub mod stake;

use thorchain_core::{Context, Tags};

// Re-exports
pub use auth::{Account, AccountKeeper};
pub use bank::{BankHandler, BankKeeper, MsgSend};
pub use clp::{ClpGenesis, ClpHandler, ClpKeeper, LiquidityProvider, Pool};
pub use error::{ModuleError, Result, TxError};
pub use fee::FeeCollectionKeeper;
pub use gov::{GovGenesis, GovHandler, GovKeeper, Proposal, ProposalStatus};
pub use ibc::{IbcHandler, IbcMapper, IbcPacket};
pub use msg::{all_codec_entries, codec_entry, decode_canonical, DecodeFn, Message, Msg};
pub use slashing::{Evidence, SlashingHandler, SlashingKeeper, VoteInfo};
pub use stake::{GenesisValidator, StakeGenesis, StakeHandler, StakeKeeper, Validator};

/// Executes the messages of one route
pub trait Handler: Send + Sync {
    /// Route this handler is registered under
    fn route(&self) -> &'static str;

    /// Apply one message; state changes land in `ctx`
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags>;
}
