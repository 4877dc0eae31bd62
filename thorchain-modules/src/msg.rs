//! Message kinds handled by the modules
//!
//! Every message type declares its kind (`route/name`), its signers and a
//! stateless validity check. [`Msg`] is the closed set the router dispatches
//! on; decoding goes through [`codec_entry`] functions collected at startup.

use crate::{
    bank::MsgSend,
    clp::{MsgAddLiquidity, MsgCreatePool, MsgSwap},
    error::{ModuleError, Result},
    gov::{MsgDeposit, MsgSubmitProposal, MsgVote},
    ibc::{MsgIbcReceive, MsgIbcTransfer},
    slashing::MsgUnjail,
    stake::{MsgCreateValidator, MsgDelegate, MsgUnbond},
    Handler,
};
use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};
use thorchain_core::Address;

/// A concrete message type
pub trait Message: Serialize + DeserializeOwned + Into<Msg> {
    /// Registered kind, `route/name`
    const KIND: &'static str;

    /// Addresses that must sign, in order
    fn signers(&self) -> Vec<Address>;

    /// Checks that need no state
    fn validate_basic(&self) -> Result<()>;
}

/// Decoder from wire bytes to a message
pub type DecodeFn = fn(&[u8]) -> Result<Msg>;

/// Decode wire bytes produced by `bincode::serialize`, rejecting any
/// trailing bytes so each value has exactly one encoding
pub fn decode_canonical<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(bytes)?)
}

fn decode<M: Message>(bytes: &[u8]) -> Result<Msg> {
    let msg: M = decode_canonical(bytes)?;
    Ok(msg.into())
}

/// Kind and decoder of one message type
pub fn codec_entry<M: Message>() -> (&'static str, DecodeFn) {
    (M::KIND, decode::<M>)
}

/// Route part of a kind (`bank/send` → `bank`)
pub fn route_of(kind: &str) -> &str {
    kind.split('/').next().unwrap_or(kind)
}

macro_rules! messages {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Every message the application understands
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Msg {
            $(
                #[allow(missing_docs)]
                $variant($ty),
            )*
        }

        $(
            impl From<$ty> for Msg {
                fn from(msg: $ty) -> Self {
                    Msg::$variant(msg)
                }
            }
        )*

        impl Msg {
            /// Registered kind
            pub fn kind(&self) -> &'static str {
                match self {
                    $(Msg::$variant(_) => <$ty as Message>::KIND,)*
                }
            }

            /// Required signers
            pub fn signers(&self) -> Vec<Address> {
                match self {
                    $(Msg::$variant(m) => m.signers(),)*
                }
            }

            /// Stateless checks
            pub fn validate_basic(&self) -> Result<()> {
                match self {
                    $(Msg::$variant(m) => m.validate_basic(),)*
                }
            }

            /// Bincode value bytes, without the kind
            pub fn encode_value(&self) -> Result<Vec<u8>> {
                let bytes = match self {
                    $(Msg::$variant(m) => bincode::serialize(m),)*
                };
                bytes.map_err(|e| ModuleError::Internal(e.to_string()))
            }
        }

        /// Decoders of every message type
        pub fn all_codec_entries() -> Vec<(&'static str, DecodeFn)> {
            vec![$(codec_entry::<$ty>(),)*]
        }
    };
}

messages! {
    Send(MsgSend),
    IbcTransfer(MsgIbcTransfer),
    IbcReceive(MsgIbcReceive),
    CreateValidator(MsgCreateValidator),
    Delegate(MsgDelegate),
    Unbond(MsgUnbond),
    Unjail(MsgUnjail),
    SubmitProposal(MsgSubmitProposal),
    Deposit(MsgDeposit),
    Vote(MsgVote),
    CreatePool(MsgCreatePool),
    AddLiquidity(MsgAddLiquidity),
    Swap(MsgSwap),
}

impl Msg {
    /// Route this message is dispatched on
    pub fn route(&self) -> &'static str {
        route_of(self.kind())
    }
}

/// Reject a message the handler was not registered for
pub(crate) fn unrecognized(handler: &dyn Handler, msg: &Msg) -> ModuleError {
    ModuleError::UnknownRequest(format!(
        "unrecognized {} message kind: {}",
        handler.route(),
        msg.kind()
    ))
}
