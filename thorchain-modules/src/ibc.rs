//! Cross-chain coin transfer
//!
//! Outgoing transfers escrow the sender's coins and queue a packet per
//! destination chain. Incoming packets are delivered by a relayer and must
//! arrive in ingress-sequence order.
//!
//! # Keys (`ibc` partition)
//!
//! - `egress/<chain>/<seq>` → [`IbcPacket`]
//! - `egress_seq/<chain>` → next egress sequence
//! - `ingress_seq/<chain>` → next expected ingress sequence

use crate::{
    bank::BankKeeper,
    error::{ModuleError, Result},
    msg::{unrecognized, Message, Msg},
    Handler,
};
use serde::{Deserialize, Serialize};
use thorchain_core::{Address, Coins, Context, StoreKey, Tag, Tags};

/// Coins travelling between chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcPacket {
    /// Sender on the source chain
    pub src_addr: Address,
    /// Recipient on the destination chain
    pub dest_addr: Address,
    /// Coins transferred
    pub coins: Coins,
    /// Source chain ID
    pub src_chain: String,
    /// Destination chain ID
    pub dest_chain: String,
}

fn validate_chain_id(chain_id: &str) -> Result<()> {
    if chain_id.is_empty() || chain_id.contains('/') {
        return Err(ModuleError::InvalidPacket(format!("bad chain id {:?}", chain_id)));
    }
    Ok(())
}

fn egress_key(dest_chain: &str, sequence: u64) -> Vec<u8> {
    let mut key = format!("egress/{}/", dest_chain).into_bytes();
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn egress_seq_key(dest_chain: &str) -> Vec<u8> {
    format!("egress_seq/{}", dest_chain).into_bytes()
}

fn ingress_seq_key(src_chain: &str) -> Vec<u8> {
    format!("ingress_seq/{}", src_chain).into_bytes()
}

/// Packet queues and sequences
#[derive(Debug, Clone)]
pub struct IbcMapper {
    key: StoreKey,
}

impl IbcMapper {
    /// Create new mapper bound to its partition
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    /// Next egress sequence toward a chain
    pub fn egress_sequence(&self, ctx: &Context<'_>, dest_chain: &str) -> Result<u64> {
        Ok(ctx.get::<u64>(&self.key, &egress_seq_key(dest_chain))?.unwrap_or(0))
    }

    /// Next expected ingress sequence from a chain
    pub fn ingress_sequence(&self, ctx: &Context<'_>, src_chain: &str) -> Result<u64> {
        Ok(ctx.get::<u64>(&self.key, &ingress_seq_key(src_chain))?.unwrap_or(0))
    }

    fn set_ingress_sequence(&self, ctx: &mut Context<'_>, src_chain: &str, seq: u64) -> Result<()> {
        ctx.set(&self.key, &ingress_seq_key(src_chain), &seq)?;
        Ok(())
    }

    /// Queue a packet for its destination; returns its sequence
    pub fn post_packet(&self, ctx: &mut Context<'_>, packet: &IbcPacket) -> Result<u64> {
        let sequence = self.egress_sequence(ctx, &packet.dest_chain)?;
        ctx.set(&self.key, &egress_key(&packet.dest_chain, sequence), packet)?;
        ctx.set(&self.key, &egress_seq_key(&packet.dest_chain), &(sequence + 1))?;
        Ok(sequence)
    }

    /// Queued packet by destination and sequence
    pub fn get_packet(&self, ctx: &Context<'_>, dest_chain: &str, sequence: u64) -> Result<Option<IbcPacket>> {
        Ok(ctx.get(&self.key, &egress_key(dest_chain, sequence))?)
    }
}

/// Send coins to an address on another chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgIbcTransfer {
    /// Sender (signer)
    pub src_addr: Address,
    /// Recipient on the destination chain
    pub dest_addr: Address,
    /// Coins to transfer
    pub coins: Coins,
    /// Destination chain ID
    pub dest_chain: String,
}

impl Message for MsgIbcTransfer {
    const KIND: &'static str = "ibc/transfer";

    fn signers(&self) -> Vec<Address> {
        vec![self.src_addr]
    }

    fn validate_basic(&self) -> Result<()> {
        validate_chain_id(&self.dest_chain)?;
        if !self.coins.is_valid() || self.coins.is_zero() {
            return Err(ModuleError::InvalidCoins(self.coins.to_string()));
        }
        Ok(())
    }
}

/// Relayer delivery of a packet from another chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgIbcReceive {
    /// Relayer (signer)
    pub relayer: Address,
    /// Packet being delivered
    pub packet: IbcPacket,
    /// Sequence on the source chain
    pub sequence: u64,
}

impl Message for MsgIbcReceive {
    const KIND: &'static str = "ibc/receive";

    fn signers(&self) -> Vec<Address> {
        vec![self.relayer]
    }

    fn validate_basic(&self) -> Result<()> {
        validate_chain_id(&self.packet.src_chain)?;
        validate_chain_id(&self.packet.dest_chain)?;
        if !self.packet.coins.is_valid() || self.packet.coins.is_zero() {
            return Err(ModuleError::InvalidCoins(self.packet.coins.to_string()));
        }
        Ok(())
    }
}

/// Router entry for `ibc`
#[derive(Debug, Clone)]
pub struct IbcHandler {
    mapper: IbcMapper,
    bank: BankKeeper,
}

impl IbcHandler {
    /// Create handler
    pub fn new(mapper: IbcMapper, bank: BankKeeper) -> Self {
        Self { mapper, bank }
    }

    fn handle_transfer(&self, ctx: &mut Context<'_>, msg: &MsgIbcTransfer) -> Result<Tags> {
        self.bank.subtract_coins(ctx, &msg.src_addr, &msg.coins)?;
        let packet = IbcPacket {
            src_addr: msg.src_addr,
            dest_addr: msg.dest_addr,
            coins: msg.coins.clone(),
            src_chain: ctx.chain_id().to_string(),
            dest_chain: msg.dest_chain.clone(),
        };
        let sequence = self.mapper.post_packet(ctx, &packet)?;
        Ok(vec![
            Tag::new("sender", msg.src_addr.to_hex()),
            Tag::new("dest-chain", msg.dest_chain.clone()),
            Tag::new("sequence", sequence.to_string()),
        ])
    }

    fn handle_receive(&self, ctx: &mut Context<'_>, msg: &MsgIbcReceive) -> Result<Tags> {
        let packet = &msg.packet;
        if packet.dest_chain != ctx.chain_id() {
            return Err(ModuleError::InvalidPacket(format!(
                "packet for {} delivered to {}",
                packet.dest_chain,
                ctx.chain_id()
            )));
        }

        let expected = self.mapper.ingress_sequence(ctx, &packet.src_chain)?;
        if msg.sequence != expected {
            return Err(ModuleError::InvalidPacketSequence {
                expected,
                got: msg.sequence,
            });
        }

        self.bank.add_coins(ctx, &packet.dest_addr, &packet.coins)?;
        self.mapper
            .set_ingress_sequence(ctx, &packet.src_chain, expected + 1)?;
        Ok(vec![
            Tag::new("recipient", packet.dest_addr.to_hex()),
            Tag::new("src-chain", packet.src_chain.clone()),
        ])
    }
}

impl Handler for IbcHandler {
    fn route(&self) -> &'static str {
        "ibc"
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<Tags> {
        match msg {
            Msg::IbcTransfer(msg) => self.handle_transfer(ctx, msg),
            Msg::IbcReceive(msg) => self.handle_receive(ctx, msg),
            other => Err(unrecognized(self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use chrono::Utc;
    use thorchain_core::{BlockHeader, MemStore};

    fn setup() -> (IbcHandler, BankKeeper) {
        let bank = BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")));
        (IbcHandler::new(IbcMapper::new(StoreKey::new("ibc")), bank.clone()), bank)
    }

    #[test]
    fn test_transfer_escrows_and_queues() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let (handler, bank) = setup();
        let alice = Address::from_bytes([1; 20]);
        bank.add_coins(&mut ctx, &alice, &Coins::single("RUNE", 50)).unwrap();

        let msg = MsgIbcTransfer {
            src_addr: alice,
            dest_addr: Address::from_bytes([2; 20]),
            coins: Coins::single("RUNE", 20),
            dest_chain: "binance".to_string(),
        };
        handler.handle(&mut ctx, &msg.clone().into()).unwrap();
        handler.handle(&mut ctx, &msg.into()).unwrap();

        assert_eq!(bank.get_coins(&ctx, &alice).unwrap().amount_of("RUNE"), 10);
        assert_eq!(handler.mapper.egress_sequence(&ctx, "binance").unwrap(), 2);
        let packet = handler.mapper.get_packet(&ctx, "binance", 1).unwrap().unwrap();
        assert_eq!(packet.src_chain, "thor");
    }

    #[test]
    fn test_receive_in_order_only() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("thor", Utc::now()));
        let (handler, bank) = setup();
        let bob = Address::from_bytes([2; 20]);

        let receive = |sequence| MsgIbcReceive {
            relayer: Address::from_bytes([9; 20]),
            packet: IbcPacket {
                src_addr: Address::from_bytes([1; 20]),
                dest_addr: bob,
                coins: Coins::single("BNB", 5),
                src_chain: "binance".to_string(),
                dest_chain: "thor".to_string(),
            },
            sequence,
        };

        let err = handler.handle(&mut ctx, &receive(1).into()).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidPacketSequence { expected: 0, got: 1 }));

        handler.handle(&mut ctx, &receive(0).into()).unwrap();
        handler.handle(&mut ctx, &receive(1).into()).unwrap();
        assert_eq!(bank.get_coins(&ctx, &bob).unwrap().amount_of("BNB"), 10);
    }

    #[test]
    fn test_chain_id_with_slash_rejected() {
        let msg = MsgIbcTransfer {
            src_addr: Address::from_bytes([1; 20]),
            dest_addr: Address::from_bytes([2; 20]),
            coins: Coins::single("RUNE", 1),
            dest_chain: "a/b".to_string(),
        };
        assert!(msg.validate_basic().is_err());
    }
}
