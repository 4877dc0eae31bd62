//! Property-based tests for supply conservation
//!
//! Transfers and swaps move coins around but never mint or burn them.

use chrono::Utc;
use proptest::prelude::*;
use thorchain_core::{Address, BlockHeader, Coin, Coins, Context, MemStore, StoreKey};
use thorchain_modules::{
    clp::{MsgCreatePool, MsgSwap, RUNE},
    AccountKeeper, BankKeeper, ClpKeeper,
};

fn addr(i: u8) -> Address {
    Address::from_bytes([i + 1; 20])
}

fn total_of(bank: &BankKeeper, ctx: &Context<'_>, denom: &str, holders: u8) -> u64 {
    (0..holders)
        .map(|i| bank.get_coins(ctx, &addr(i)).unwrap().amount_of(denom))
        .sum()
}

proptest! {
    #[test]
    fn prop_sends_conserve_supply(
        sends in prop::collection::vec((0u8..4, 0u8..4, 1u64..500), 1..40)
    ) {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let bank = BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")));
        for i in 0..4 {
            bank.add_coins(&mut ctx, &addr(i), &Coins::single(RUNE, 1_000)).unwrap();
        }

        for (from, to, amount) in sends {
            let before = bank.get_coins(&ctx, &addr(from)).unwrap().amount_of(RUNE);
            let result = bank.send_coins(&mut ctx, &addr(from), &addr(to), &Coins::single(RUNE, amount));
            prop_assert_eq!(result.is_ok(), before >= amount);
        }

        prop_assert_eq!(total_of(&bank, &ctx, RUNE, 4), 4_000);
    }

    #[test]
    fn prop_swaps_conserve_supply_and_grow_k(
        swaps in prop::collection::vec((any::<bool>(), 1u64..2_000), 1..30)
    ) {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let bank = BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")));
        let clp = ClpKeeper::new(StoreKey::new("clp"), bank.clone());
        let funds = Coins::new(vec![Coin::new("BNB", 50_000), Coin::new(RUNE, 50_000)]).unwrap();
        bank.add_coins(&mut ctx, &addr(0), &funds).unwrap();
        clp.create_pool(&mut ctx, &MsgCreatePool {
            creator: addr(0),
            ticker: "BNB".to_string(),
            token_amount: 10_000,
            rune_amount: 10_000,
        }).unwrap();

        let mut k = 10_000u128 * 10_000;
        for (buy_bnb, amount) in swaps {
            let (from, to) = if buy_bnb { (RUNE, "BNB") } else { ("BNB", RUNE) };
            let msg = MsgSwap {
                sender: addr(0),
                from_denom: from.to_string(),
                to_denom: to.to_string(),
                amount,
                min_out: 0,
            };
            let _ = clp.swap(&mut ctx, &msg);

            let pool = clp.get_pool(&ctx, "BNB").unwrap().unwrap();
            let next_k = pool.token_balance as u128 * pool.rune_balance as u128;
            prop_assert!(next_k >= k);
            k = next_k;

            for denom in ["BNB", RUNE] {
                let held = total_of(&bank, &ctx, denom, 1);
                let reserve = if denom == RUNE { pool.rune_balance } else { pool.token_balance };
                prop_assert_eq!(held + reserve, 50_000);
            }
        }
    }
}
