//! Fee collection

use crate::error::Result;
use thorchain_core::{Coins, Context, StoreKey};

const COLLECTED_FEES_KEY: &[u8] = b"collectedFees";

/// Accumulates transaction fees (`fee` partition)
#[derive(Debug, Clone)]
pub struct FeeCollectionKeeper {
    key: StoreKey,
}

impl FeeCollectionKeeper {
    /// Create new keeper bound to its partition
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    /// Fees collected so far
    pub fn get_collected_fees(&self, ctx: &Context<'_>) -> Result<Coins> {
        Ok(ctx
            .get::<Coins>(&self.key, COLLECTED_FEES_KEY)?
            .unwrap_or_default())
    }

    /// Add to the collected fees
    pub fn add_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> Result<Coins> {
        let total = self.get_collected_fees(ctx)?.checked_add(fees)?;
        ctx.set(&self.key, COLLECTED_FEES_KEY, &total)?;
        Ok(total)
    }

    /// Reset to zero
    pub fn clear_collected_fees(&self, ctx: &mut Context<'_>) -> Result<()> {
        ctx.delete(&self.key, COLLECTED_FEES_KEY)?;
        Ok(())
    }
}
