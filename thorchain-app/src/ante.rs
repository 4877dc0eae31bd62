//! Transaction pre-processing
//!
//! Runs before any message handler: stateless checks, then per signer the
//! public key, account number, sequence and signature, then the fee. Every
//! write happens in a cache that only reaches the caller's store when all
//! checks pass, so a rejected transaction leaves no trace.

use crate::codec::{StdSignDoc, StdTx};
use thorchain_core::{Address, CacheStore, Context, PublicKey};
use thorchain_modules::{
    Account, AccountKeeper, BankKeeper, FeeCollectionKeeper, ModuleError, Msg, Result,
};
use tracing::debug;

/// Longest memo accepted, in characters
pub const MAX_MEMO_CHARACTERS: usize = 256;

/// Signers of all messages, first appearance first
pub fn signers_of(msgs: &[Msg]) -> Vec<Address> {
    let mut signers: Vec<Address> = Vec::new();
    for msg in msgs {
        for signer in msg.signers() {
            if !signers.contains(&signer) {
                signers.push(signer);
            }
        }
    }
    signers
}

/// Ante stage
#[derive(Debug, Clone)]
pub struct AnteHandler {
    accounts: AccountKeeper,
    bank: BankKeeper,
    fees: FeeCollectionKeeper,
}

impl AnteHandler {
    /// Create new ante handler over the keepers it needs
    pub fn new(accounts: AccountKeeper, bank: BankKeeper, fees: FeeCollectionKeeper) -> Self {
        Self {
            accounts,
            bank,
            fees,
        }
    }

    /// Validate `tx` and charge its fee; nothing is written on failure
    pub fn handle(&self, ctx: &mut Context<'_>, tx: &StdTx, msgs: &[Msg]) -> Result<()> {
        let header = ctx.header().clone();
        let mut cache = CacheStore::new(ctx.store());
        {
            let mut cached = Context::new(&mut cache, header);
            self.run(&mut cached, tx, msgs)?;
        }
        cache.write()?;
        Ok(())
    }

    fn run(&self, ctx: &mut Context<'_>, tx: &StdTx, msgs: &[Msg]) -> Result<()> {
        validate_basic(tx, msgs)?;

        let signers = signers_of(msgs);
        if tx.signatures.len() != signers.len() {
            return Err(ModuleError::Unauthorized(format!(
                "wrong number of signers; expected {}, got {}",
                signers.len(),
                tx.signatures.len()
            )));
        }

        let chain_id = ctx.chain_id().to_string();
        for (signer, sig) in signers.iter().zip(&tx.signatures) {
            let mut account = self
                .accounts
                .get_account(ctx, signer)?
                .ok_or(ModuleError::UnknownAddress(*signer))?;

            let pub_key = resolve_pub_key(&account, sig.pub_key.as_ref())?;
            if sig.account_number != account.account_number {
                return Err(ModuleError::Unauthorized(format!(
                    "invalid account number; expected {}, got {}",
                    account.account_number, sig.account_number
                )));
            }
            if sig.sequence != account.sequence {
                return Err(ModuleError::InvalidSequence {
                    expected: account.sequence,
                    got: sig.sequence,
                });
            }

            let sign_bytes = StdSignDoc {
                chain_id: &chain_id,
                account_number: account.account_number,
                sequence: account.sequence,
                fee: &tx.fee,
                msgs: &tx.msgs,
                memo: &tx.memo,
            }
            .to_bytes()?;
            if !sig.signature.verify(&sign_bytes, &pub_key) {
                return Err(ModuleError::Unauthorized("signature verification failed".to_string()));
            }

            account.pub_key = Some(pub_key);
            account.sequence += 1;
            self.accounts.set_account(ctx, &account)?;
        }

        if let Some(payer) = signers.first() {
            self.deduct_fee(ctx, payer, tx)?;
        }

        debug!(signers = signers.len(), msgs = msgs.len(), "Ante checks passed");
        Ok(())
    }

    fn deduct_fee(&self, ctx: &mut Context<'_>, payer: &Address, tx: &StdTx) -> Result<()> {
        let fee = &tx.fee.amount;
        if !fee.is_valid() {
            return Err(ModuleError::InsufficientFee(format!("invalid fee {}", fee)));
        }
        if fee.is_zero() {
            return Ok(());
        }

        self.bank
            .subtract_coins(ctx, payer, fee)
            .map_err(|e| ModuleError::InsufficientFee(format!("cannot pay fee {}: {}", fee, e)))?;
        self.fees.add_collected_fees(ctx, fee)?;
        Ok(())
    }
}

fn validate_basic(tx: &StdTx, msgs: &[Msg]) -> Result<()> {
    if msgs.is_empty() {
        return Err(ModuleError::InvalidMsg("transaction has no messages".to_string()));
    }
    let memo_len = tx.memo.chars().count();
    if memo_len > MAX_MEMO_CHARACTERS {
        return Err(ModuleError::MemoTooLarge {
            len: memo_len,
            max: MAX_MEMO_CHARACTERS,
        });
    }
    for msg in msgs {
        msg.validate_basic()?;
    }
    Ok(())
}

/// Key to verify with: the one on record, else the one supplied
fn resolve_pub_key(account: &Account, supplied: Option<&PublicKey>) -> Result<PublicKey> {
    match (account.pub_key, supplied) {
        (Some(stored), Some(given)) if &stored != given => Err(ModuleError::InvalidPubKey(
            format!("supplied key does not match the key on record for {}", account.address),
        )),
        (Some(stored), _) => Ok(stored),
        (None, Some(given)) => {
            if given.address() != account.address {
                return Err(ModuleError::InvalidPubKey(format!(
                    "key {} does not belong to {}",
                    given.address(),
                    account.address
                )));
            }
            Ok(*given)
        }
        (None, None) => Err(ModuleError::InvalidPubKey(format!(
            "no public key on record or supplied for {}",
            account.address
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StdFee;
    use chrono::Utc;
    use thorchain_core::{crypto::KeyPair, BlockHeader, Coins, MemStore, StoreKey};
    use thorchain_modules::MsgSend;

    struct Fixture {
        ante: AnteHandler,
        accounts: AccountKeeper,
        bank: BankKeeper,
        fees: FeeCollectionKeeper,
        alice: KeyPair,
    }

    fn fixture(ctx: &mut Context<'_>) -> Fixture {
        let accounts = AccountKeeper::new(StoreKey::new("acc"));
        let bank = BankKeeper::new(accounts.clone());
        let fees = FeeCollectionKeeper::new(StoreKey::new("fee"));
        let alice = KeyPair::from_seed(&[1; 32]);
        bank.add_coins(ctx, &alice.address(), &Coins::single("RUNE", 100)).unwrap();
        Fixture {
            ante: AnteHandler::new(accounts.clone(), bank.clone(), fees.clone()),
            accounts,
            bank,
            fees,
            alice,
        }
    }

    fn send_from(from: Address) -> Msg {
        MsgSend {
            from,
            to: Address::from_bytes([9; 20]),
            amount: Coins::single("RUNE", 1),
        }
        .into()
    }

    #[test]
    fn test_valid_tx_charges_fee_and_bumps_sequence() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let msgs = vec![send_from(f.alice.address())];
        let tx = StdTx::sign("thor", &msgs, StdFee::new("RUNE", 10, 0), "", &[(&f.alice, 0, 0)]).unwrap();

        f.ante.handle(&mut ctx, &tx, &msgs).unwrap();

        let account = f.accounts.must_get_account(&ctx, &f.alice.address()).unwrap();
        assert_eq!(account.sequence, 1);
        assert_eq!(account.pub_key, Some(f.alice.public_key()));
        assert_eq!(f.bank.get_coins(&ctx, &f.alice.address()).unwrap().amount_of("RUNE"), 90);
        assert_eq!(f.fees.get_collected_fees(&ctx).unwrap().amount_of("RUNE"), 10);
    }

    #[test]
    fn test_failed_fee_leaves_no_trace() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let msgs = vec![send_from(f.alice.address())];
        let tx = StdTx::sign("thor", &msgs, StdFee::new("RUNE", 1_000, 0), "", &[(&f.alice, 0, 0)]).unwrap();

        let err = f.ante.handle(&mut ctx, &tx, &msgs).unwrap_err();
        assert!(matches!(err, ModuleError::InsufficientFee(_)));

        let account = f.accounts.must_get_account(&ctx, &f.alice.address()).unwrap();
        assert_eq!(account.sequence, 0);
        assert_eq!(account.pub_key, None);
        assert_eq!(account.coins.amount_of("RUNE"), 100);
    }

    #[test]
    fn test_wrong_sequence() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let msgs = vec![send_from(f.alice.address())];
        let tx = StdTx::sign("thor", &msgs, StdFee::default(), "", &[(&f.alice, 0, 5)]).unwrap();

        let err = f.ante.handle(&mut ctx, &tx, &msgs).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidSequence { expected: 0, got: 5 }));
    }

    #[test]
    fn test_signature_from_other_chain_rejected() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let msgs = vec![send_from(f.alice.address())];
        let tx = StdTx::sign("other", &msgs, StdFee::default(), "", &[(&f.alice, 0, 0)]).unwrap();

        let err = f.ante.handle(&mut ctx, &tx, &msgs).unwrap_err();
        assert!(matches!(err, ModuleError::Unauthorized(_)));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let mallory = KeyPair::from_seed(&[2; 32]);
        let msgs = vec![send_from(f.alice.address())];
        let tx = StdTx::sign("thor", &msgs, StdFee::default(), "", &[(&mallory, 0, 0)]).unwrap();

        let err = f.ante.handle(&mut ctx, &tx, &msgs).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidPubKey(_)));
    }

    #[test]
    fn test_unknown_signer() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let bob = KeyPair::from_seed(&[3; 32]);
        let msgs = vec![send_from(bob.address())];
        let tx = StdTx::sign("thor", &msgs, StdFee::default(), "", &[(&bob, 0, 0)]).unwrap();

        let err = f.ante.handle(&mut ctx, &tx, &msgs).unwrap_err();
        assert!(matches!(err, ModuleError::UnknownAddress(addr) if addr == bob.address()));
    }

    #[test]
    fn test_memo_and_signature_count_limits() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let f = fixture(&mut ctx);
        let msgs = vec![send_from(f.alice.address())];

        let memo = "x".repeat(MAX_MEMO_CHARACTERS + 1);
        let tx = StdTx::sign("thor", &msgs, StdFee::default(), &memo, &[(&f.alice, 0, 0)]).unwrap();
        assert!(matches!(
            f.ante.handle(&mut ctx, &tx, &msgs),
            Err(ModuleError::MemoTooLarge { .. })
        ));

        let tx = StdTx::sign("thor", &msgs, StdFee::default(), "", &[]).unwrap();
        assert!(matches!(
            f.ante.handle(&mut ctx, &tx, &msgs),
            Err(ModuleError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_signers_first_appearance_order() {
        let a = Address::from_bytes([5; 20]);
        let b = Address::from_bytes([1; 20]);
        let msgs = vec![send_from(a), send_from(b), send_from(a)];
        assert_eq!(signers_of(&msgs), vec![a, b]);
    }
}
