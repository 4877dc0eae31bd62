//! Continuous liquidity pools
//!
//! Every pool pairs one token with RUNE and prices swaps on the constant
//! product `x * y = k`. Token-to-token swaps route through RUNE. All math is
//! integer (u128 intermediates), rounding down in the pool's favour.
//!
//! # Keys (`clp` partition)
//!
//! - `0x01 ‖ ticker` → [`Pool`]
//! - `0x02 ‖ ticker ‖ 0x00 ‖ provider` → liquidity units

use crate::{
    bank::BankKeeper,
    error::{ModuleError, Result},
    msg::{unrecognized, Message, Msg},
    Handler,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thorchain_core::{Address, Coins, Context, StoreKey, Tag, Tags};

/// Denom every pool is paired with
pub const RUNE: &str = "RUNE";

const POOL_PREFIX: &[u8] = &[0x01];
const UNITS_PREFIX: &[u8] = &[0x02];
const MAX_TICKER_LEN: usize = 8;

fn pool_key(ticker: &str) -> Vec<u8> {
    let mut key = POOL_PREFIX.to_vec();
    key.extend_from_slice(ticker.as_bytes());
    key
}

fn units_key(ticker: &str, provider: &Address) -> Vec<u8> {
    let mut key = UNITS_PREFIX.to_vec();
    key.extend_from_slice(ticker.as_bytes());
    key.push(0x00);
    key.extend_from_slice(provider.as_bytes());
    key
}

fn validate_ticker(ticker: &str) -> Result<()> {
    let ok = !ticker.is_empty()
        && ticker.len() <= MAX_TICKER_LEN
        && ticker.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && ticker != RUNE;
    if ok {
        Ok(())
    } else {
        Err(ModuleError::InvalidMsg(format!("invalid pool ticker {:?}", ticker)))
    }
}

fn mul_div(a: u64, b: u64, c: u64) -> Result<u64> {
    if c == 0 {
        return Err(ModuleError::InsufficientLiquidity("empty pool".to_string()));
    }
    u64::try_from(a as u128 * b as u128 / c as u128)
        .map_err(|_| ModuleError::Internal("amount overflow".to_string()))
}

/// A token/RUNE pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Token ticker (also its denom)
    pub ticker: String,
    /// Token reserve
    pub token_balance: u64,
    /// RUNE reserve
    pub rune_balance: u64,
    /// Liquidity units issued
    pub pool_units: u64,
}

impl Pool {
    /// Output of selling `amount` of one side for the other
    pub fn swap_output(&self, amount: u64, selling_rune: bool) -> Result<u64> {
        let (x, y) = if selling_rune {
            (self.rune_balance, self.token_balance)
        } else {
            (self.token_balance, self.rune_balance)
        };
        let denominator = x
            .checked_add(amount)
            .ok_or_else(|| ModuleError::Internal("amount overflow".to_string()))?;
        mul_div(amount, y, denominator)
    }

    fn apply_swap(&mut self, amount: u64, out: u64, selling_rune: bool) -> Result<()> {
        let ticker = &self.ticker;
        let (input, output) = if selling_rune {
            (&mut self.rune_balance, &mut self.token_balance)
        } else {
            (&mut self.token_balance, &mut self.rune_balance)
        };
        *input = input
            .checked_add(amount)
            .ok_or_else(|| ModuleError::PoolOverflow(ticker.clone()))?;
        *output = output.checked_sub(out).ok_or_else(|| {
            ModuleError::InsufficientLiquidity(format!("pool {} cannot pay {}", ticker, out))
        })?;
        Ok(())
    }

    /// Reserves and units after a deposit, or an error if any would overflow
    fn deposit(&self, token: u64, rune: u64, units: u64) -> Result<Pool> {
        let overflow = || ModuleError::PoolOverflow(self.ticker.clone());
        Ok(Pool {
            ticker: self.ticker.clone(),
            token_balance: self.token_balance.checked_add(token).ok_or_else(overflow)?,
            rune_balance: self.rune_balance.checked_add(rune).ok_or_else(overflow)?,
            pool_units: self.pool_units.checked_add(units).ok_or_else(overflow)?,
        })
    }
}

/// Liquidity units of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityProvider {
    /// Pool ticker
    pub ticker: String,
    /// Provider address
    pub provider: Address,
    /// Units held
    pub units: u64,
}

/// CLP section of the genesis document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClpGenesis {
    /// Pools
    pub pools: Vec<Pool>,
    /// Provider units
    pub providers: Vec<LiquidityProvider>,
}

/// Pool state manager
#[derive(Debug, Clone)]
pub struct ClpKeeper {
    key: StoreKey,
    bank: BankKeeper,
}

impl ClpKeeper {
    /// Create new keeper bound to its partition and the bank
    pub fn new(key: StoreKey, bank: BankKeeper) -> Self {
        Self { key, bank }
    }

    /// Pool by ticker
    pub fn get_pool(&self, ctx: &Context<'_>, ticker: &str) -> Result<Option<Pool>> {
        Ok(ctx.get(&self.key, &pool_key(ticker))?)
    }

    fn must_get_pool(&self, ctx: &Context<'_>, ticker: &str) -> Result<Pool> {
        self.get_pool(ctx, ticker)?
            .ok_or_else(|| ModuleError::PoolNotFound(ticker.to_string()))
    }

    fn set_pool(&self, ctx: &mut Context<'_>, pool: &Pool) -> Result<()> {
        ctx.set(&self.key, &pool_key(&pool.ticker), pool)?;
        Ok(())
    }

    /// Every pool, in ticker order
    pub fn iterate_pools(&self, ctx: &Context<'_>) -> Result<Vec<Pool>> {
        Ok(ctx.prefix_values(&self.key, POOL_PREFIX)?)
    }

    /// Units a provider holds in a pool
    pub fn get_units(&self, ctx: &Context<'_>, ticker: &str, provider: &Address) -> Result<u64> {
        Ok(ctx
            .get::<LiquidityProvider>(&self.key, &units_key(ticker, provider))?
            .map(|lp| lp.units)
            .unwrap_or(0))
    }

    fn add_units(&self, ctx: &mut Context<'_>, ticker: &str, provider: &Address, units: u64) -> Result<()> {
        let held = self.get_units(ctx, ticker, provider)?;
        let record = LiquidityProvider {
            ticker: ticker.to_string(),
            provider: *provider,
            units: held
                .checked_add(units)
                .ok_or_else(|| ModuleError::PoolOverflow(ticker.to_string()))?,
        };
        ctx.set(&self.key, &units_key(ticker, provider), &record)?;
        Ok(())
    }

    fn take_deposit(&self, ctx: &mut Context<'_>, from: &Address, ticker: &str, token: u64, rune: u64) -> Result<()> {
        let coins = Coins::single(ticker, token).checked_add(&Coins::single(RUNE, rune))?;
        self.bank.subtract_coins(ctx, from, &coins)?;
        Ok(())
    }

    /// Open a pool with its first deposit
    pub fn create_pool(&self, ctx: &mut Context<'_>, msg: &MsgCreatePool) -> Result<Pool> {
        if self.get_pool(ctx, &msg.ticker)?.is_some() {
            return Err(ModuleError::PoolExists(msg.ticker.clone()));
        }
        self.take_deposit(ctx, &msg.creator, &msg.ticker, msg.token_amount, msg.rune_amount)?;

        let pool = Pool {
            ticker: msg.ticker.clone(),
            token_balance: msg.token_amount,
            rune_balance: msg.rune_amount,
            pool_units: msg.rune_amount,
        };
        self.set_pool(ctx, &pool)?;
        self.add_units(ctx, &pool.ticker, &msg.creator, pool.pool_units)?;
        Ok(pool)
    }

    /// Deposit both sides; units follow the smaller share contributed
    ///
    /// Overflowing reserves are rejected before any coins move.
    pub fn add_liquidity(&self, ctx: &mut Context<'_>, msg: &MsgAddLiquidity) -> Result<u64> {
        let pool = self.must_get_pool(ctx, &msg.ticker)?;
        let units = if pool.pool_units == 0 {
            msg.rune_amount
        } else {
            mul_div(msg.rune_amount, pool.pool_units, pool.rune_balance)?
                .min(mul_div(msg.token_amount, pool.pool_units, pool.token_balance)?)
        };
        if units == 0 {
            return Err(ModuleError::InsufficientLiquidity(
                "deposit too small for one unit".to_string(),
            ));
        }

        let pool = pool.deposit(msg.token_amount, msg.rune_amount, units)?;
        let held = self.get_units(ctx, &msg.ticker, &msg.provider)?;
        if held.checked_add(units).is_none() {
            return Err(ModuleError::PoolOverflow(msg.ticker.clone()));
        }

        self.take_deposit(ctx, &msg.provider, &msg.ticker, msg.token_amount, msg.rune_amount)?;
        self.set_pool(ctx, &pool)?;
        self.add_units(ctx, &msg.ticker, &msg.provider, units)?;
        Ok(units)
    }

    fn quote_leg(&self, ctx: &Context<'_>, ticker: &str, amount: u64, selling_rune: bool) -> Result<(Pool, u64)> {
        let mut pool = self.must_get_pool(ctx, ticker)?;
        let out = pool.swap_output(amount, selling_rune)?;
        if out == 0 {
            return Err(ModuleError::InsufficientLiquidity(format!(
                "swap of {} yields nothing from pool {}",
                amount, ticker
            )));
        }
        pool.apply_swap(amount, out, selling_rune)?;
        Ok((pool, out))
    }

    /// Swap through one or two pools; returns the output amount
    ///
    /// Nothing is written unless the swap succeeds as a whole.
    pub fn swap(&self, ctx: &mut Context<'_>, msg: &MsgSwap) -> Result<u64> {
        let (pools, out) = match (msg.from_denom.as_str(), msg.to_denom.as_str()) {
            (RUNE, token) => {
                let (pool, out) = self.quote_leg(ctx, token, msg.amount, true)?;
                (vec![pool], out)
            }
            (token, RUNE) => {
                let (pool, out) = self.quote_leg(ctx, token, msg.amount, false)?;
                (vec![pool], out)
            }
            (from, to) => {
                let (sell, rune) = self.quote_leg(ctx, from, msg.amount, false)?;
                let (buy, out) = self.quote_leg(ctx, to, rune, true)?;
                (vec![sell, buy], out)
            }
        };
        if out < msg.min_out {
            return Err(ModuleError::SlippageExceeded {
                out,
                min_out: msg.min_out,
            });
        }

        self.bank
            .subtract_coins(ctx, &msg.sender, &Coins::single(&msg.from_denom, msg.amount))?;
        for pool in &pools {
            self.set_pool(ctx, pool)?;
        }
        self.bank
            .add_coins(ctx, &msg.sender, &Coins::single(&msg.to_denom, out))?;
        Ok(out)
    }

    /// Load the CLP section of a genesis document
    pub fn init_genesis(&self, ctx: &mut Context<'_>, genesis: &ClpGenesis) -> Result<()> {
        let mut tickers = BTreeSet::new();
        for pool in &genesis.pools {
            validate_ticker(&pool.ticker)?;
            if !tickers.insert(pool.ticker.clone()) {
                return Err(ModuleError::PoolExists(pool.ticker.clone()));
            }
            self.set_pool(ctx, pool)?;
        }
        for lp in &genesis.providers {
            if !tickers.contains(&lp.ticker) {
                return Err(ModuleError::PoolNotFound(lp.ticker.clone()));
            }
            ctx.set(&self.key, &units_key(&lp.ticker, &lp.provider), lp)?;
        }
        Ok(())
    }

    /// CLP section of an exported genesis document
    pub fn export_genesis(&self, ctx: &Context<'_>) -> Result<ClpGenesis> {
        Ok(ClpGenesis {
            pools: self.iterate_pools(ctx)?,
            providers: ctx.prefix_values(&self.key, UNITS_PREFIX)?,
        })
    }
}

/// Open a new pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreatePool {
    /// Creator (signer)
    pub creator: Address,
    /// Token ticker
    pub ticker: String,
    /// Initial token reserve
    pub token_amount: u64,
    /// Initial RUNE reserve
    pub rune_amount: u64,
}

impl Message for MsgCreatePool {
    const KIND: &'static str = "clp/create";

    fn signers(&self) -> Vec<Address> {
        vec![self.creator]
    }

    fn validate_basic(&self) -> Result<()> {
        validate_ticker(&self.ticker)?;
        if self.token_amount == 0 || self.rune_amount == 0 {
            return Err(ModuleError::InvalidCoins("pool reserves must be positive".to_string()));
        }
        Ok(())
    }
}

/// Add to an existing pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddLiquidity {
    /// Provider (signer)
    pub provider: Address,
    /// Token ticker
    pub ticker: String,
    /// Token deposit
    pub token_amount: u64,
    /// RUNE deposit
    pub rune_amount: u64,
}

impl Message for MsgAddLiquidity {
    const KIND: &'static str = "clp/add_liquidity";

    fn signers(&self) -> Vec<Address> {
        vec![self.provider]
    }

    fn validate_basic(&self) -> Result<()> {
        validate_ticker(&self.ticker)?;
        if self.token_amount == 0 && self.rune_amount == 0 {
            return Err(ModuleError::InvalidCoins("empty deposit".to_string()));
        }
        Ok(())
    }
}

/// Sell one denom for another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSwap {
    /// Sender (signer)
    pub sender: Address,
    /// Denom sold
    pub from_denom: String,
    /// Denom bought
    pub to_denom: String,
    /// Amount sold
    pub amount: u64,
    /// Least acceptable output
    pub min_out: u64,
}

impl Message for MsgSwap {
    const KIND: &'static str = "clp/swap";

    fn signers(&self) -> Vec<Address> {
        vec![self.sender]
    }

    fn validate_basic(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(ModuleError::InvalidCoins("swap amount is zero".to_string()));
        }
        if self.from_denom == self.to_denom {
            return Err(ModuleError::InvalidMsg("cannot swap a denom for itself".to_string()));
        }
        for denom in [&self.from_denom, &self.to_denom] {
            if denom != RUNE {
                validate_ticker(denom)?;
            }
        }
        Ok(())
    }
}

/// Router entry for `clp`
#[derive(Debug, Clone)]
pub struct ClpHandler {
    keeper: ClpKeeper,
}

impl ClpHandler {
    /// Create handler
    pub fn new(keeper: ClpKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for ClpHandler {
    fn route(&self) -> &'static str {
        "clp"
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags> {
        match msg {
            Msg::CreatePool(msg) => {
                let pool = self.keeper.create_pool(ctx, msg)?;
                Ok(vec![
                    Tag::new("action", "create_pool"),
                    Tag::new("pool", pool.ticker),
                ])
            }
            Msg::AddLiquidity(msg) => {
                let units = self.keeper.add_liquidity(ctx, msg)?;
                Ok(vec![
                    Tag::new("action", "add_liquidity"),
                    Tag::new("pool", msg.ticker.clone()),
                    Tag::new("units", units.to_string()),
                ])
            }
            Msg::Swap(msg) => {
                let out = self.keeper.swap(ctx, msg)?;
                Ok(vec![
                    Tag::new("action", "swap"),
                    Tag::new("sender", msg.sender.to_hex()),
                    Tag::new("output", format!("{}{}", out, msg.to_denom)),
                ])
            }
            other => Err(unrecognized(self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use chrono::Utc;
    use thorchain_core::{BlockHeader, Coin, MemStore};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn setup(ctx: &mut Context<'_>) -> (ClpKeeper, BankKeeper) {
        let bank = BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")));
        let keeper = ClpKeeper::new(StoreKey::new("clp"), bank.clone());
        let funds = Coins::new(vec![
            Coin::new("BNB", 10_000),
            Coin::new("ETH", 10_000),
            Coin::new(RUNE, 100_000),
        ])
        .unwrap();
        bank.add_coins(ctx, &addr(1), &funds).unwrap();
        (keeper, bank)
    }

    fn create(keeper: &ClpKeeper, ctx: &mut Context<'_>, ticker: &str, token: u64, rune: u64) {
        keeper
            .create_pool(
                ctx,
                &MsgCreatePool {
                    creator: addr(1),
                    ticker: ticker.to_string(),
                    token_amount: token,
                    rune_amount: rune,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_swap_constant_product() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, bank) = setup(&mut ctx);
        create(&keeper, &mut ctx, "BNB", 1_000, 10_000);

        let msg = MsgSwap {
            sender: addr(1),
            from_denom: RUNE.to_string(),
            to_denom: "BNB".to_string(),
            amount: 1_000,
            min_out: 90,
        };
        // 1000 * 1000 / (10000 + 1000) = 90
        assert_eq!(keeper.swap(&mut ctx, &msg).unwrap(), 90);

        let pool = keeper.get_pool(&ctx, "BNB").unwrap().unwrap();
        assert_eq!((pool.token_balance, pool.rune_balance), (910, 11_000));
        assert_eq!(bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("BNB"), 9_090);
    }

    #[test]
    fn test_slippage_guard() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, _) = setup(&mut ctx);
        create(&keeper, &mut ctx, "BNB", 1_000, 10_000);

        let msg = MsgSwap {
            sender: addr(1),
            from_denom: RUNE.to_string(),
            to_denom: "BNB".to_string(),
            amount: 1_000,
            min_out: 91,
        };
        let err = keeper.swap(&mut ctx, &msg).unwrap_err();
        assert!(matches!(err, ModuleError::SlippageExceeded { out: 90, min_out: 91 }));
    }

    #[test]
    fn test_double_swap_through_rune() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, bank) = setup(&mut ctx);
        create(&keeper, &mut ctx, "BNB", 1_000, 10_000);
        create(&keeper, &mut ctx, "ETH", 1_000, 10_000);

        let msg = MsgSwap {
            sender: addr(1),
            from_denom: "BNB".to_string(),
            to_denom: "ETH".to_string(),
            amount: 100,
            min_out: 0,
        };
        // BNB→RUNE: 100 * 10000 / 1100 = 909; RUNE→ETH: 909 * 1000 / 10909 = 83
        assert_eq!(keeper.swap(&mut ctx, &msg).unwrap(), 83);
        assert_eq!(bank.get_coins(&ctx, &addr(1)).unwrap().amount_of("ETH"), 9_083);
    }

    #[test]
    fn test_add_liquidity_units() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, _) = setup(&mut ctx);
        create(&keeper, &mut ctx, "BNB", 1_000, 10_000);

        let units = keeper
            .add_liquidity(
                &mut ctx,
                &MsgAddLiquidity {
                    provider: addr(1),
                    ticker: "BNB".to_string(),
                    token_amount: 100,
                    rune_amount: 2_000,
                },
            )
            .unwrap();
        assert_eq!(units, 1_000);
        assert_eq!(keeper.get_units(&ctx, "BNB", &addr(1)).unwrap(), 11_000);
    }

    #[test]
    fn test_duplicate_pool_and_genesis_roundtrip() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, _) = setup(&mut ctx);
        create(&keeper, &mut ctx, "BNB", 1_000, 10_000);

        let err = keeper
            .create_pool(
                &mut ctx,
                &MsgCreatePool {
                    creator: addr(1),
                    ticker: "BNB".to_string(),
                    token_amount: 1,
                    rune_amount: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ModuleError::PoolExists(_)));

        let exported = keeper.export_genesis(&ctx).unwrap();
        let mut fresh = MemStore::new();
        let mut fresh_ctx = Context::new(&mut fresh, BlockHeader::genesis("test", Utc::now()));
        keeper.init_genesis(&mut fresh_ctx, &exported).unwrap();
        assert_eq!(keeper.export_genesis(&fresh_ctx).unwrap(), exported);
    }

    #[test]
    fn test_add_liquidity_rejects_reserve_overflow() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, bank) = setup(&mut ctx);
        let huge = u64::MAX - 10;
        let genesis = ClpGenesis {
            pools: vec![Pool {
                ticker: "BNB".to_string(),
                token_balance: huge,
                rune_balance: huge,
                pool_units: huge,
            }],
            providers: vec![],
        };
        keeper.init_genesis(&mut ctx, &genesis).unwrap();
        let before = bank.get_coins(&ctx, &addr(1)).unwrap();

        let err = keeper
            .add_liquidity(
                &mut ctx,
                &MsgAddLiquidity {
                    provider: addr(1),
                    ticker: "BNB".to_string(),
                    token_amount: 100,
                    rune_amount: 100,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ModuleError::PoolOverflow(ref t) if t == "BNB"));
        assert_eq!(err.code(), ("clp", 5));

        assert_eq!(bank.get_coins(&ctx, &addr(1)).unwrap(), before);
        assert_eq!(keeper.get_pool(&ctx, "BNB").unwrap().unwrap(), genesis.pools[0]);
        assert_eq!(keeper.get_units(&ctx, "BNB", &addr(1)).unwrap(), 0);
    }

    #[test]
    fn test_swap_rejects_reserve_overflow() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let (keeper, bank) = setup(&mut ctx);
        let pool = Pool {
            ticker: "BNB".to_string(),
            token_balance: 1_000,
            rune_balance: u64::MAX - 10,
            pool_units: 1_000,
        };
        keeper
            .init_genesis(&mut ctx, &ClpGenesis { pools: vec![pool.clone()], providers: vec![] })
            .unwrap();

        let msg = MsgSwap {
            sender: addr(1),
            from_denom: RUNE.to_string(),
            to_denom: "BNB".to_string(),
            amount: 100,
            min_out: 0,
        };
        assert!(keeper.swap(&mut ctx, &msg).is_err());
        assert_eq!(keeper.get_pool(&ctx, "BNB").unwrap().unwrap(), pool);
        assert_eq!(bank.get_coins(&ctx, &addr(1)).unwrap().amount_of(RUNE), 100_000);
    }

    #[test]
    fn test_ticker_rules() {
        assert!(validate_ticker("BNB").is_ok());
        assert!(validate_ticker("RUNE").is_err());
        assert!(validate_ticker("bnb").is_err());
        assert!(validate_ticker("TOOLONGTICKER").is_err());
    }
}
