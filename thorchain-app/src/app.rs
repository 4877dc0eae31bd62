//! Block lifecycle orchestrator
//!
//! [`ThorchainApp`] owns the commit store, the codec registry, the router,
//! the ante handler and the module keepers as named collaborators, and
//! drives them through the lifecycle calls of the consensus engine.
//!
//! # Hook order
//!
//! - InitChain: accounts → stake → gov → clp
//! - BeginBlock: slashing (evidence, then liveness)
//! - EndBlock: stake (validator updates) → gov (tallies)

use crate::{
    ante::AnteHandler,
    codec::Codec,
    genesis::{self, ExportedState, GenesisState},
    router::Router,
    state::{LifecycleCall, Phase},
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use thorchain_core::{
    Address, BlockHeader, CacheStore, CommitId, CommitStore, Context, KvStore, Metrics,
    StoreConfig, StoreKey, StoreProof, Tags, ValidatorUpdate,
};
use thorchain_modules::{
    AccountKeeper, BankHandler, BankKeeper, ClpHandler, ClpKeeper, Evidence,
    FeeCollectionKeeper, GovHandler, GovKeeper, IbcHandler, IbcMapper, ModuleError,
    SlashingHandler, SlashingKeeper, StakeHandler, StakeKeeper, TxError, VoteInfo,
};
use tracing::{debug, info, warn};

/// Application name reported to consensus
pub const APP_NAME: &str = "thorchain";

/// Store partitions in mount order; must never change between releases
pub const STORE_PARTITIONS: [&str; 8] = ["main", "acc", "ibc", "stake", "slashing", "gov", "fee", "clp"];

const CHAIN_ID_KEY: &[u8] = b"chain_id";
const LAST_HEADER_KEY: &[u8] = b"last_header";

/// Outcome of one transaction
pub type TxResult = std::result::Result<Tags, TxError>;

/// Every module keeper, wired to its partition and dependencies
#[derive(Debug, Clone)]
pub struct Keepers {
    /// Accounts
    pub accounts: AccountKeeper,
    /// Balances
    pub bank: BankKeeper,
    /// Collected fees
    pub fees: FeeCollectionKeeper,
    /// Cross-chain packets
    pub ibc: IbcMapper,
    /// Validators and delegations
    pub stake: StakeKeeper,
    /// Liveness and double-sign punishment
    pub slashing: SlashingKeeper,
    /// Governance
    pub gov: GovKeeper,
    /// Liquidity pools
    pub clp: ClpKeeper,
}

impl Keepers {
    /// Wire keepers to the partitions named in [`STORE_PARTITIONS`]
    pub fn new() -> Self {
        let accounts = AccountKeeper::new(StoreKey::new("acc"));
        let bank = BankKeeper::new(accounts.clone());
        let stake = StakeKeeper::new(StoreKey::new("stake"), bank.clone());
        Self {
            fees: FeeCollectionKeeper::new(StoreKey::new("fee")),
            ibc: IbcMapper::new(StoreKey::new("ibc")),
            slashing: SlashingKeeper::new(StoreKey::new("slashing"), stake.clone()),
            gov: GovKeeper::new(StoreKey::new("gov"), bank.clone(), stake.clone()),
            clp: ClpKeeper::new(StoreKey::new("clp"), bank.clone()),
            accounts,
            bank,
            stake,
        }
    }

    /// Router with one handler per module route
    pub fn router(&self) -> Result<Router> {
        let mut router = Router::new();
        router.add_route("bank", Box::new(BankHandler::new(self.bank.clone())))?;
        router.add_route("ibc", Box::new(IbcHandler::new(self.ibc.clone(), self.bank.clone())))?;
        router.add_route("stake", Box::new(StakeHandler::new(self.stake.clone())))?;
        router.add_route("slashing", Box::new(SlashingHandler::new(self.slashing.clone())))?;
        router.add_route("gov", Box::new(GovHandler::new(self.gov.clone())))?;
        router.add_route("clp", Box::new(ClpHandler::new(self.clp.clone())))?;
        Ok(router)
    }

    /// Ante handler over the account, bank and fee keepers
    pub fn ante_handler(&self) -> AnteHandler {
        AnteHandler::new(self.accounts.clone(), self.bank.clone(), self.fees.clone())
    }
}

impl Default for Keepers {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of EndBlock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndBlockResponse {
    /// Validator set changes for consensus
    pub validator_updates: Vec<ValidatorUpdate>,
    /// Tags emitted by the hooks
    pub tags: Tags,
}

/// Result of a read-only query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Committed height the answer is from
    pub height: u64,
    /// Key queried
    pub key: Vec<u8>,
    /// Value, if present
    pub value: Option<Vec<u8>>,
    /// Inclusion proof, when requested and the key exists
    pub proof: Option<StoreProof>,
}

/// The THORChain state machine
pub struct ThorchainApp {
    store: CommitStore,
    codec: Codec,
    router: Router,
    ante: AnteHandler,
    keepers: Keepers,
    main_key: StoreKey,
    phase: Phase,
    chain_id: Option<String>,
    header: Option<BlockHeader>,
    metrics: Metrics,
}

impl std::fmt::Debug for ThorchainApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThorchainApp")
            .field("phase", &self.phase)
            .field("chain_id", &self.chain_id)
            .field("last_commit", &self.store.last_commit_id())
            .finish()
    }
}

fn decode_main<T: serde::de::DeserializeOwned>(bytes: Option<Vec<u8>>) -> Result<Option<T>> {
    bytes
        .map(|b| bincode::deserialize(&b))
        .transpose()
        .map_err(|e| Error::Store(e.into()))
}

impl ThorchainApp {
    /// Open the store, mount every partition and assemble the modules
    pub fn new(config: StoreConfig) -> Result<Self> {
        let partitions: Vec<StoreKey> = STORE_PARTITIONS.iter().map(|name| StoreKey::new(name)).collect();
        let main_key = partitions[0].clone();

        let mut store = CommitStore::new(config);
        store.mount(&partitions)?;
        let commit = store.load_latest_committed()?;

        let (chain_id, header) = {
            let view = store.committed_view()?;
            let chain_id: Option<String> = decode_main(view.get(&main_key, CHAIN_ID_KEY)?)?;
            let header: Option<BlockHeader> = decode_main(view.get(&main_key, LAST_HEADER_KEY)?)?;
            (chain_id, header)
        };

        let keepers = Keepers::new();
        let router = keepers.router()?;
        let metrics = Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;

        let phase = if commit.version == 0 {
            Phase::Uninitialized
        } else {
            Phase::Committed
        };
        info!(
            version = commit.version,
            root = %hex::encode(commit.root),
            ?phase,
            "Application loaded"
        );

        Ok(Self {
            store,
            codec: Codec::with_all_messages()?,
            router,
            ante: keepers.ante_handler(),
            keepers,
            main_key,
            phase,
            chain_id,
            header,
            metrics,
        })
    }

    /// Keepers, for read access in tests and tooling
    pub fn keepers(&self) -> &Keepers {
        &self.keepers
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Chain ID once genesis is applied
    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    /// Last committed version and root
    pub fn last_commit_id(&self) -> CommitId {
        self.store.last_commit_id()
    }

    /// Prometheus metrics of this instance
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn advance(&mut self, call: LifecycleCall) -> Result<()> {
        self.phase = self.phase.transition(call)?;
        Ok(())
    }

    /// Apply the genesis document; returns the initial validator set
    ///
    /// On any failure the block buffer is discarded and the app stays
    /// uninitialized.
    pub fn init_chain(
        &mut self,
        chain_id: &str,
        genesis_time: DateTime<Utc>,
        genesis_bytes: &[u8],
    ) -> Result<Vec<ValidatorUpdate>> {
        self.phase.transition(LifecycleCall::InitChain)?;
        info!(chain_id, "InitChain");

        let genesis = GenesisState::from_json(genesis_bytes)?;
        let header = BlockHeader::genesis(chain_id, genesis_time);
        let applied = {
            let mut ctx = Context::new(&mut self.store, header);
            ctx.set(&self.main_key, CHAIN_ID_KEY, &chain_id.to_string())
                .map_err(Error::from)
                .and_then(|_| genesis::init_genesis(&self.keepers, &mut ctx, &genesis))
        };

        match applied {
            Ok(updates) => {
                self.advance(LifecycleCall::InitChain)?;
                self.chain_id = Some(chain_id.to_string());
                Ok(updates)
            }
            Err(err) => {
                self.store.discard_pending();
                Err(err)
            }
        }
    }

    /// Start a block: slashing evidence and liveness
    pub fn begin_block(
        &mut self,
        header: BlockHeader,
        votes: &[VoteInfo],
        evidence: &[Evidence],
    ) -> Result<Tags> {
        self.advance(LifecycleCall::BeginBlock)?;
        debug!(height = header.height, votes = votes.len(), evidence = evidence.len(), "BeginBlock");

        let tags = {
            let mut ctx = Context::new(&mut self.store, header.clone());
            ctx.set(&self.main_key, LAST_HEADER_KEY, &header)?;
            self.keepers
                .slashing
                .begin_blocker(&mut ctx, votes, evidence)
                .map_err(|e| Error::Hook {
                    hook: "slashing begin-block",
                    reason: e.to_string(),
                })?
        };
        self.header = Some(header);
        Ok(tags)
    }

    /// Execute one transaction; failures are per-transaction results
    pub fn deliver_tx(&mut self, tx_bytes: &[u8]) -> Result<TxResult> {
        self.advance(LifecycleCall::DeliverTx)?;
        let header = self.header.clone().ok_or(Error::InvalidLifecycle {
            call: LifecycleCall::DeliverTx.name(),
            phase: self.phase,
        })?;

        let result = execute_tx(
            &self.codec,
            &self.ante,
            &self.router,
            &mut self.store,
            header,
            tx_bytes,
            true,
        )
        .map_err(TxError::from);

        self.metrics.record_tx(result.is_ok());
        if let Err(err) = &result {
            warn!(code = err.code, codespace = %err.codespace, log = %err.log, "DeliverTx rejected");
        }
        Ok(result)
    }

    /// Mempool admission: decode and ante against committed state only
    pub fn check_tx(&self, tx_bytes: &[u8]) -> Result<TxResult> {
        let chain_id = self.chain_id.clone().ok_or(Error::InvalidLifecycle {
            call: "CheckTx",
            phase: self.phase,
        })?;
        let mut header = self.committed_header();
        header.chain_id = chain_id;
        header.height += 1;

        let mut view = self.store.committed_view()?;
        let mut scratch = CacheStore::new(&mut view);
        let result = execute_tx(
            &self.codec,
            &self.ante,
            &self.router,
            &mut scratch,
            header,
            tx_bytes,
            false,
        )
        .map_err(TxError::from);
        Ok(result)
    }

    /// Close a block: validator updates, then governance
    pub fn end_block(&mut self) -> Result<EndBlockResponse> {
        self.advance(LifecycleCall::EndBlock)?;
        let header = self.header.clone().ok_or(Error::InvalidLifecycle {
            call: LifecycleCall::EndBlock.name(),
            phase: self.phase,
        })?;

        let mut ctx = Context::new(&mut self.store, header);
        let validator_updates = self.keepers.stake.end_blocker(&mut ctx).map_err(|e| Error::Hook {
            hook: "stake end-block",
            reason: e.to_string(),
        })?;
        let tags = self.keepers.gov.end_blocker(&mut ctx).map_err(|e| Error::Hook {
            hook: "gov end-block",
            reason: e.to_string(),
        })?;

        debug!(updates = validator_updates.len(), "EndBlock");
        Ok(EndBlockResponse {
            validator_updates,
            tags,
        })
    }

    /// Persist the block atomically; returns the new state root
    pub fn commit(&mut self) -> Result<CommitId> {
        self.advance(LifecycleCall::Commit)?;
        let started = Instant::now();
        let id = self.store.commit()?;
        self.metrics
            .record_commit(id.version, started.elapsed().as_secs_f64());

        info!(version = id.version, root = %hex::encode(id.root), "Committed");
        Ok(id)
    }

    fn committed_header(&self) -> BlockHeader {
        self.header.clone().unwrap_or_else(|| {
            BlockHeader::genesis(self.chain_id.clone().unwrap_or_default(), DateTime::<Utc>::default())
        })
    }

    /// Run a read-only closure against the last commit
    ///
    /// Never sees writes of the block in progress.
    pub fn read_committed<R>(
        &self,
        f: impl FnOnce(&Keepers, &Context<'_>) -> thorchain_modules::Result<R>,
    ) -> thorchain_modules::Result<R> {
        let mut view = self.store.committed_view()?;
        let ctx = Context::new(&mut view, self.committed_header());
        f(&self.keepers, &ctx)
    }

    /// Genesis document of the last committed state
    pub fn export_state(&self) -> Result<ExportedState> {
        let height = self.store.last_commit_id().version;
        let (state, validators) = self
            .read_committed(|keepers, ctx| {
                Ok((
                    genesis::export_genesis(keepers, ctx)?,
                    keepers.stake.write_validators(ctx)?,
                ))
            })
            .map_err(|e| Error::Hook {
                hook: "export",
                reason: e.to_string(),
            })?;

        info!(height, accounts = state.accounts.len(), "State exported");
        Ok(ExportedState {
            app_state: state.to_json()?,
            validators,
            height,
        })
    }

    /// Read-only query against the last commit
    ///
    /// Paths: `/store/<partition>/key` with the raw key as data, and
    /// `/account/<hex address>` answering with the account as JSON.
    pub fn query(&self, path: &str, data: &[u8], prove: bool) -> std::result::Result<QueryResult, TxError> {
        self.query_inner(path, data, prove).map_err(TxError::from)
    }

    fn query_inner(&self, path: &str, data: &[u8], prove: bool) -> thorchain_modules::Result<QueryResult> {
        let height = self.store.last_commit_id().version;
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match segments.as_slice() {
            ["store", partition, "key"] => {
                let key = self
                    .store
                    .mounted()
                    .iter()
                    .find(|k| k.name() == *partition)
                    .cloned()
                    .ok_or_else(|| ModuleError::UnknownRequest(format!("unknown partition {}", partition)))?;
                let value = self.store.committed_view()?.get(&key, data)?;
                let proof = if prove && value.is_some() {
                    self.store.prove(&key, data)?
                } else {
                    None
                };
                Ok(QueryResult {
                    height,
                    key: data.to_vec(),
                    value,
                    proof,
                })
            }
            ["account", hex_address] => {
                let address: Address = hex_address
                    .parse()
                    .map_err(|e: thorchain_core::Error| ModuleError::InvalidAddress(e.to_string()))?;
                let account = self.read_committed(|keepers, ctx| keepers.accounts.get_account(ctx, &address))?;
                Ok(QueryResult {
                    height,
                    key: address.as_bytes().to_vec(),
                    value: account.map(|a| to_json(&a)).transpose()?,
                    proof: None,
                })
            }
            _ => Err(ModuleError::UnknownRequest(format!("unknown query path {}", path))),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> thorchain_modules::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ModuleError::Internal(e.to_string()))
}

/// Decode, ante, then run every message in its own cache
///
/// With `deliver` false only decoding and ante run, for mempool checks.
fn execute_tx(
    codec: &Codec,
    ante: &AnteHandler,
    router: &Router,
    store: &mut dyn KvStore,
    header: BlockHeader,
    tx_bytes: &[u8],
    deliver: bool,
) -> thorchain_modules::Result<Tags> {
    let (tx, msgs) = codec.decode_tx(tx_bytes)?;
    ante.handle(&mut Context::new(store, header.clone()), &tx, &msgs)?;
    if !deliver {
        return Ok(Vec::new());
    }

    let mut cache = CacheStore::new(store);
    let mut tags = Vec::new();
    {
        let mut ctx = Context::new(&mut cache, header);
        for msg in &msgs {
            tags.extend(router.dispatch(&mut ctx, msg)?);
        }
    }
    cache.write()?;
    Ok(tags)
}
