//! Lifecycle state machine
//!
//! ```text
//! Uninitialized ─InitChain─▶ ChainInitialized ─BeginBlock─▶ BlockOpen
//!                                                  ▲            │ DeliverTx*
//!                                         BeginBlock│            │ EndBlock
//!                                                  │            ▼
//!                                             Committed ◀─Commit─ BlockClosed
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Where the application is in the block lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No genesis applied yet
    Uninitialized,
    /// Genesis applied, first block not started
    ChainInitialized,
    /// Between BeginBlock and EndBlock
    BlockOpen,
    /// Between EndBlock and Commit
    BlockClosed,
    /// Last block committed
    Committed,
}

/// Calls the consensus engine drives the app with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCall {
    /// Genesis
    InitChain,
    /// Start of a block
    BeginBlock,
    /// One transaction
    DeliverTx,
    /// End of a block
    EndBlock,
    /// Persist the block
    Commit,
}

impl LifecycleCall {
    /// Call name as used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            LifecycleCall::InitChain => "InitChain",
            LifecycleCall::BeginBlock => "BeginBlock",
            LifecycleCall::DeliverTx => "DeliverTx",
            LifecycleCall::EndBlock => "EndBlock",
            LifecycleCall::Commit => "Commit",
        }
    }
}

impl Phase {
    /// Phase after `call`, or an error if `call` is not valid now
    pub fn transition(self, call: LifecycleCall) -> Result<Phase> {
        use LifecycleCall::*;
        use Phase::*;

        let next = match (self, call) {
            (Uninitialized, InitChain) => ChainInitialized,
            (ChainInitialized | Committed, BeginBlock) => BlockOpen,
            (BlockOpen, DeliverTx) => BlockOpen,
            (BlockOpen, EndBlock) => BlockClosed,
            (BlockClosed, Commit) => Committed,
            (phase, call) => {
                return Err(Error::InvalidLifecycle {
                    call: call.name(),
                    phase,
                })
            }
        };
        Ok(next)
    }

    /// Whether genesis has been applied
    pub fn is_initialized(self) -> bool {
        self != Phase::Uninitialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut phase = Phase::Uninitialized;
        for call in [
            LifecycleCall::InitChain,
            LifecycleCall::BeginBlock,
            LifecycleCall::DeliverTx,
            LifecycleCall::DeliverTx,
            LifecycleCall::EndBlock,
            LifecycleCall::Commit,
            LifecycleCall::BeginBlock,
        ] {
            phase = phase.transition(call).unwrap();
        }
        assert_eq!(phase, Phase::BlockOpen);
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        assert!(Phase::Uninitialized.transition(LifecycleCall::BeginBlock).is_err());
        assert!(Phase::ChainInitialized.transition(LifecycleCall::InitChain).is_err());
        assert!(Phase::BlockOpen.transition(LifecycleCall::Commit).is_err());
        assert!(Phase::BlockClosed.transition(LifecycleCall::DeliverTx).is_err());
        assert!(Phase::Committed.transition(LifecycleCall::EndBlock).is_err());
    }

    #[test]
    fn test_error_names_call_and_phase() {
        let err = Phase::Committed
            .transition(LifecycleCall::DeliverTx)
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("DeliverTx"));
        assert!(text.contains("Committed"));
    }
}
