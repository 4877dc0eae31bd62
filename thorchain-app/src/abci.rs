//! ABCI Application implementation
//!
//! Adapts [`ThorchainApp`] to the Application BlockChain Interface of
//! CometBFT. Each consensus call is forwarded under one lock, so blocks are
//! processed strictly in order. Errors that leave the state machine
//! unusable stop the process.

use crate::{
    app::{ThorchainApp, TxResult, APP_NAME},
    Error,
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tendermint_abci::Application;
use tendermint_proto::google::protobuf::Timestamp;
use tendermint_proto::v0_37::{
    abci::{
        Event, EventAttribute, MisbehaviorType, RequestBeginBlock, RequestCheckTx,
        RequestDeliverTx, RequestEndBlock, RequestInfo, RequestInitChain, RequestQuery,
        ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx,
        ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseQuery,
        ValidatorUpdate as AbciValidatorUpdate,
    },
    crypto::{public_key, ProofOp, ProofOps, PublicKey as AbciPublicKey},
};
use thorchain_core::{Address, BlockHeader, Tags, ValidatorUpdate};
use thorchain_modules::{Evidence, TxError, VoteInfo};
use tracing::{error, info};

/// Proof op type attached to store query answers
pub const STORE_PROOF_TYPE: &str = "thorchain:store";

/// Shareable ABCI front of the application
#[derive(Clone)]
pub struct AbciApp {
    inner: Arc<Mutex<ThorchainApp>>,
}

impl std::fmt::Debug for AbciApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbciApp").finish_non_exhaustive()
    }
}

impl AbciApp {
    /// Wrap an application
    pub fn new(app: ThorchainApp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(app)),
        }
    }

    /// Shared handle to the wrapped application
    pub fn app(&self) -> Arc<Mutex<ThorchainApp>> {
        self.inner.clone()
    }
}

fn fatal(err: Error) -> ! {
    error!(error = %err, "Fatal application error, stopping node");
    std::process::exit(1)
}

fn to_datetime(ts: Option<Timestamp>) -> DateTime<Utc> {
    ts.and_then(|ts| Utc.timestamp_opt(ts.seconds, ts.nanos.max(0) as u32).single())
        .unwrap_or_default()
}

fn to_address(bytes: &[u8]) -> Option<Address> {
    <[u8; Address::LEN]>::try_from(bytes).ok().map(Address::from_bytes)
}

fn to_events(kind: &str, tags: Tags) -> Vec<Event> {
    if tags.is_empty() {
        return Vec::new();
    }
    vec![Event {
        r#type: kind.to_string(),
        attributes: tags
            .into_iter()
            .map(|tag| EventAttribute {
                key: tag.key,
                value: tag.value,
                index: true,
            })
            .collect(),
    }]
}

fn to_i64(field: &'static str, value: u64) -> Result<i64, Error> {
    i64::try_from(value).map_err(|_| Error::OutOfRange { field, value })
}

fn to_validator_updates(updates: Vec<ValidatorUpdate>) -> Result<Vec<AbciValidatorUpdate>, Error> {
    updates
        .into_iter()
        .map(|update| {
            Ok(AbciValidatorUpdate {
                pub_key: Some(AbciPublicKey {
                    sum: Some(public_key::Sum::Ed25519(update.pub_key.as_bytes().to_vec().into())),
                }),
                power: to_i64("power", update.power)?,
            })
        })
        .collect()
}

fn to_deliver_response(result: TxResult) -> ResponseDeliverTx {
    match result {
        Ok(tags) => ResponseDeliverTx {
            code: 0,
            events: to_events("message", tags),
            ..Default::default()
        },
        Err(TxError { codespace, code, log }) => ResponseDeliverTx {
            code,
            codespace,
            log,
            ..Default::default()
        },
    }
}

fn decode_header(request: &RequestBeginBlock) -> BlockHeader {
    let header = request.header.clone().unwrap_or_default();
    BlockHeader {
        chain_id: header.chain_id,
        height: header.height.max(0) as u64,
        time: to_datetime(header.time),
        proposer: to_address(&header.proposer_address),
    }
}

fn decode_votes(request: &RequestBeginBlock) -> Vec<VoteInfo> {
    request
        .last_commit_info
        .iter()
        .flat_map(|commit| commit.votes.iter())
        .filter_map(|vote| {
            let validator = vote.validator.as_ref()?;
            Some(VoteInfo {
                validator: to_address(&validator.address)?,
                power: validator.power.max(0) as u64,
                signed_last_block: vote.signed_last_block,
            })
        })
        .collect()
}

fn decode_evidence(request: &RequestBeginBlock) -> Vec<Evidence> {
    request
        .byzantine_validators
        .iter()
        .filter(|m| m.r#type == MisbehaviorType::DuplicateVote as i32)
        .filter_map(|m| {
            let validator = m.validator.as_ref()?;
            Some(Evidence {
                validator: to_address(&validator.address)?,
                height: m.height.max(0) as u64,
                time: to_datetime(m.time.clone()),
                power: validator.power.max(0) as u64,
            })
        })
        .collect()
}

impl Application for AbciApp {
    fn info(&self, _request: RequestInfo) -> ResponseInfo {
        let app = self.inner.lock();
        let id = app.last_commit_id();
        info!(height = id.version, "Info request");
        let last_block_height = to_i64("height", id.version).unwrap_or_else(|err| fatal(err));

        ResponseInfo {
            data: APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            app_version: 1,
            last_block_height,
            last_block_app_hash: if id.version == 0 {
                Default::default()
            } else {
                id.root.to_vec().into()
            },
        }
    }

    fn init_chain(&self, request: RequestInitChain) -> ResponseInitChain {
        let mut app = self.inner.lock();
        let time = to_datetime(request.time);
        match app
            .init_chain(&request.chain_id, time, &request.app_state_bytes)
            .and_then(to_validator_updates)
        {
            Ok(validators) => ResponseInitChain {
                validators,
                ..Default::default()
            },
            Err(err) => fatal(err),
        }
    }

    fn query(&self, request: RequestQuery) -> ResponseQuery {
        let app = self.inner.lock();
        match app.query(&request.path, &request.data, request.prove) {
            Ok(result) => {
                let height = match to_i64("height", result.height) {
                    Ok(height) => height,
                    Err(err) => {
                        return ResponseQuery {
                            code: 1,
                            log: err.to_string(),
                            ..Default::default()
                        }
                    }
                };
                let proof_ops = result.proof.and_then(|proof| {
                    bincode::serialize(&proof).ok().map(|data| ProofOps {
                        ops: vec![ProofOp {
                            r#type: STORE_PROOF_TYPE.to_string(),
                            key: proof.key.clone().into(),
                            data: data.into(),
                        }],
                    })
                });
                ResponseQuery {
                    code: 0,
                    key: result.key.into(),
                    value: result.value.unwrap_or_default().into(),
                    proof_ops,
                    height,
                    ..Default::default()
                }
            }
            Err(err) => ResponseQuery {
                code: err.code,
                codespace: err.codespace,
                log: err.log,
                ..Default::default()
            },
        }
    }

    fn check_tx(&self, request: RequestCheckTx) -> ResponseCheckTx {
        let app = self.inner.lock();
        match app.check_tx(&request.tx) {
            Ok(Ok(_)) => ResponseCheckTx::default(),
            Ok(Err(err)) => ResponseCheckTx {
                code: err.code,
                codespace: err.codespace,
                log: err.log,
                ..Default::default()
            },
            Err(err) => ResponseCheckTx {
                code: 1,
                log: err.to_string(),
                ..Default::default()
            },
        }
    }

    fn begin_block(&self, request: RequestBeginBlock) -> ResponseBeginBlock {
        let mut app = self.inner.lock();
        let header = decode_header(&request);
        let votes = decode_votes(&request);
        let evidence = decode_evidence(&request);

        match app.begin_block(header, &votes, &evidence) {
            Ok(tags) => ResponseBeginBlock {
                events: to_events("begin_block", tags),
            },
            Err(err) => fatal(err),
        }
    }

    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx {
        let mut app = self.inner.lock();
        match app.deliver_tx(&request.tx) {
            Ok(result) => to_deliver_response(result),
            Err(err) => fatal(err),
        }
    }

    fn end_block(&self, _request: RequestEndBlock) -> ResponseEndBlock {
        let mut app = self.inner.lock();
        let response = app.end_block().and_then(|end| {
            Ok(ResponseEndBlock {
                validator_updates: to_validator_updates(end.validator_updates)?,
                events: to_events("end_block", end.tags),
                ..Default::default()
            })
        });
        response.unwrap_or_else(|err| fatal(err))
    }

    fn commit(&self) -> ResponseCommit {
        let mut app = self.inner.lock();
        match app.commit() {
            Ok(id) => ResponseCommit {
                data: id.root.to_vec().into(),
                retain_height: 0,
            },
            Err(err) => fatal(err),
        }
    }
}
