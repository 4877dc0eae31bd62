//! Transaction wire format and the message codec registry
//!
//! A transaction carries its messages as `(kind, value)` pairs. The registry
//! maps each kind to the decoder of its message type; it is built once at
//! startup and never changes afterwards.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thorchain_core::{crypto::KeyPair, Coins, PublicKey, Signature};
use thorchain_modules::{all_codec_entries, decode_canonical, DecodeFn, ModuleError, Msg};

/// Encoded message inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMsg {
    /// Registered kind (`route/name`)
    pub kind: String,
    /// Bincode-encoded message value
    pub value: Vec<u8>,
}

impl RawMsg {
    /// Encode a message
    pub fn encode(msg: &Msg) -> thorchain_modules::Result<Self> {
        Ok(Self {
            kind: msg.kind().to_string(),
            value: msg.encode_value()?,
        })
    }
}

/// Fee offered by a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
    /// Coins paid by the first signer
    pub amount: Coins,
    /// Gas limit (recorded, not metered)
    pub gas: u64,
}

impl StdFee {
    /// Fee of a single coin
    pub fn new(denom: &str, amount: u64, gas: u64) -> Self {
        Self {
            amount: Coins::single(denom, amount),
            gas,
        }
    }
}

/// Signature of one signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    /// Public key; required while the account has none on record
    pub pub_key: Option<PublicKey>,
    /// Ed25519 signature over the sign bytes
    pub signature: Signature,
    /// Account number the signer signed for
    pub account_number: u64,
    /// Sequence the signer signed for
    pub sequence: u64,
}

/// Signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdTx {
    /// Messages, executed in order
    pub msgs: Vec<RawMsg>,
    /// Fee
    pub fee: StdFee,
    /// One signature per signer, in signer order
    pub signatures: Vec<StdSignature>,
    /// Free-form note
    pub memo: String,
}

impl StdTx {
    /// Wire bytes
    pub fn to_bytes(&self) -> thorchain_modules::Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ModuleError::Internal(e.to_string()))
    }

    /// Decode wire bytes; anything after the encoded transaction is rejected
    pub fn from_bytes(bytes: &[u8]) -> thorchain_modules::Result<Self> {
        decode_canonical(bytes)
    }

    /// Build and sign a transaction
    ///
    /// `signers` pairs each key with the account number and sequence it
    /// signs for, in the order the messages name their signers.
    pub fn sign(
        chain_id: &str,
        msgs: &[Msg],
        fee: StdFee,
        memo: &str,
        signers: &[(&KeyPair, u64, u64)],
    ) -> thorchain_modules::Result<Self> {
        let raw = msgs.iter().map(RawMsg::encode).collect::<thorchain_modules::Result<Vec<_>>>()?;
        let mut signatures = Vec::with_capacity(signers.len());
        for (key, account_number, sequence) in signers {
            let doc = StdSignDoc {
                chain_id,
                account_number: *account_number,
                sequence: *sequence,
                fee: &fee,
                msgs: &raw,
                memo,
            };
            signatures.push(StdSignature {
                pub_key: Some(key.public_key()),
                signature: key.sign(&doc.to_bytes()?),
                account_number: *account_number,
                sequence: *sequence,
            });
        }
        Ok(Self {
            msgs: raw,
            fee,
            signatures,
            memo: memo.to_string(),
        })
    }
}

/// Bytes a signer commits to
///
/// Binding the chain ID and account number keeps a signature from being
/// replayed on another chain or by a recreated account.
#[derive(Debug, Serialize)]
pub struct StdSignDoc<'a> {
    /// Chain ID
    pub chain_id: &'a str,
    /// Signer's account number
    pub account_number: u64,
    /// Signer's sequence
    pub sequence: u64,
    /// Fee
    pub fee: &'a StdFee,
    /// Encoded messages
    pub msgs: &'a [RawMsg],
    /// Memo
    pub memo: &'a str,
}

impl StdSignDoc<'_> {
    /// Canonical encoding
    pub fn to_bytes(&self) -> thorchain_modules::Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ModuleError::Internal(e.to_string()))
    }
}

/// Message kind → decoder
pub struct Codec {
    decoders: BTreeMap<&'static str, DecodeFn>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("kinds", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Codec {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// Registry of every message the modules define
    pub fn with_all_messages() -> Result<Self> {
        let mut codec = Self::new();
        for entry in all_codec_entries() {
            codec.register(entry)?;
        }
        Ok(codec)
    }

    /// Add one decoder; a kind may be registered once
    pub fn register(&mut self, (kind, decode): (&'static str, DecodeFn)) -> Result<()> {
        if self.decoders.insert(kind, decode).is_some() {
            return Err(Error::DuplicateMsgKind(kind.to_string()));
        }
        Ok(())
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decode one message
    pub fn decode_msg(&self, raw: &RawMsg) -> thorchain_modules::Result<Msg> {
        let decode = self
            .decoders
            .get(raw.kind.as_str())
            .ok_or_else(|| ModuleError::UnknownRequest(format!("unknown message kind {}", raw.kind)))?;
        let msg = decode(&raw.value)?;
        if msg.kind() != raw.kind {
            return Err(ModuleError::TxDecode(format!(
                "kind {} decoded as {}",
                raw.kind,
                msg.kind()
            )));
        }
        Ok(msg)
    }

    /// Decode a transaction and all its messages
    pub fn decode_tx(&self, bytes: &[u8]) -> thorchain_modules::Result<(StdTx, Vec<Msg>)> {
        let tx = StdTx::from_bytes(bytes)?;
        let msgs = tx
            .msgs
            .iter()
            .map(|raw| self.decode_msg(raw))
            .collect::<thorchain_modules::Result<Vec<_>>>()?;
        Ok((tx, msgs))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thorchain_core::Address;
    use thorchain_modules::MsgSend;

    fn send() -> Msg {
        MsgSend {
            from: Address::from_bytes([1; 20]),
            to: Address::from_bytes([2; 20]),
            amount: Coins::single("RUNE", 3),
        }
        .into()
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let mut codec = Codec::new();
        let entry = thorchain_modules::codec_entry::<MsgSend>();
        codec.register(entry).unwrap();
        assert!(matches!(codec.register(entry), Err(Error::DuplicateMsgKind(k)) if k == "bank/send"));
    }

    #[test]
    fn test_tx_roundtrip_through_registry() {
        let codec = Codec::with_all_messages().unwrap();
        let key = KeyPair::from_seed(&[7; 32]);
        let tx = StdTx::sign("thor", &[send()], StdFee::new("RUNE", 1, 0), "hi", &[(&key, 0, 0)]).unwrap();

        let (decoded, msgs) = codec.decode_tx(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(msgs, vec![send()]);
    }

    #[test]
    fn test_unknown_kind() {
        let codec = Codec::with_all_messages().unwrap();
        let raw = RawMsg {
            kind: "bank/burn".to_string(),
            value: vec![],
        };
        assert!(matches!(codec.decode_msg(&raw), Err(ModuleError::UnknownRequest(_))));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let codec = Codec::with_all_messages().unwrap();
        assert!(matches!(codec.decode_tx(&[0xff; 3]), Err(ModuleError::TxDecode(_))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let codec = Codec::with_all_messages().unwrap();
        let key = KeyPair::from_seed(&[7; 32]);
        let tx = StdTx::sign("thor", &[send()], StdFee::new("RUNE", 1, 0), "", &[(&key, 0, 0)]).unwrap();
        let mut bytes = tx.to_bytes().unwrap();
        bytes.push(0);
        assert!(matches!(codec.decode_tx(&bytes), Err(ModuleError::TxDecode(_))));

        let mut raw = RawMsg::encode(&send()).unwrap();
        raw.value.extend_from_slice(b"xx");
        assert!(matches!(codec.decode_msg(&raw), Err(ModuleError::TxDecode(_))));
    }

    #[test]
    fn test_sign_bytes_bind_chain_id() {
        let fee = StdFee::default();
        let raw = vec![RawMsg::encode(&send()).unwrap()];
        let sign_bytes = |chain_id: &str| {
            StdSignDoc {
                chain_id,
                account_number: 0,
                sequence: 0,
                fee: &fee,
                msgs: &raw,
                memo: "",
            }
            .to_bytes()
            .unwrap()
        };
        assert_ne!(sign_bytes("a"), sign_bytes("b"));
    }
}
