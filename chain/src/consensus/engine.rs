//! Block lifecycle state machine.
//!
//! [`Blockchain`] wires together:
//!
//! - a [`BlockArchive`] for persistence,
//! - an optional [`BlockValidator`] for rules beyond the built-in checks,
//! - a [`BlockMinter`] for block construction,
//! - a [`ChainMetrics`] sink, and
//! - the registered [`BlockSubscriber`]s.
//!
//! It exposes methods to mint new blocks (for local leadership), validate
//! candidate blocks and commit them in strict height order. The tip lives
//! in a [`ChainState`] behind a read/write lock that is only held long
//! enough to snapshot or replace the tip. Commits are serialized by a
//! separate commit mutex held across the archive write and the subscriber
//! fan-out, so subscribers may read the tip but must not commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::genesis::Genesis;
use crate::metrics::{ChainMetrics, NoopMetrics};
use crate::protocol::{
    BlockCtx, BlockchainCtx, ExecutionContext, TipInfo, calc_base_fee, calc_excess_blob_gas,
    verify_eip1559_header,
};
use crate::types::{Address, Block, Footer, Hash256, Header, PrivateKey};

use super::config::{BlockchainConfig, ConfigError};
use super::error::ChainError;
use super::minter::BlockMinter;
use super::store::{ArchiveError, BlockArchive};
use super::subscriber::{BlockSubscriber, Subscribers};
use super::validator::BlockValidator;

/// Optional collaborators of a [`Blockchain`].
#[derive(Clone, Default)]
pub struct ChainOptions {
    /// External validator run after the built-in checks; `None` accepts.
    pub validator: Option<Arc<dyn BlockValidator>>,
    /// Metrics sink; `None` uses [`NoopMetrics`].
    pub metrics: Option<Arc<dyn ChainMetrics>>,
}

/// Per-call options of [`Blockchain::mint_new_block`].
#[derive(Clone, Debug, Default)]
pub struct MintOptions {
    /// Signing key; defaults to the first configured producer key.
    pub producer_key: Option<PrivateKey>,
}

/// Per-call options of [`Blockchain::validate_block`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationOptions {
    pub skip_sidecar_validation: bool,
}

/// Mutable chain state guarded by the engine lock.
#[derive(Clone, Debug)]
pub struct ChainState {
    /// Last durably committed block.
    pub tip: TipInfo,
    /// Commits are rejected while paused.
    pub paused: bool,
}

/// Records the elapsed time of an operation when dropped.
struct OpTimer<'a> {
    metrics: &'a dyn ChainMetrics,
    topic: &'static str,
    started: Instant,
}

impl<'a> OpTimer<'a> {
    fn start(metrics: &'a dyn ChainMetrics, topic: &'static str) -> Self {
        Self {
            metrics,
            topic,
            started: Instant::now(),
        }
    }
}

impl Drop for OpTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .observe_duration(self.topic, self.started.elapsed().as_secs_f64());
    }
}

/// Height-ordered block chain on top of a [`BlockArchive`].
pub struct Blockchain<A> {
    config: BlockchainConfig,
    genesis: Arc<Genesis>,
    archive: A,
    minter: Arc<dyn BlockMinter>,
    validator: Option<Arc<dyn BlockValidator>>,
    metrics: Arc<dyn ChainMetrics>,
    producer_keys: Vec<PrivateKey>,
    chain_address: Option<Address>,
    state: RwLock<ChainState>,
    commit_lock: Mutex<()>,
    subscribers: RwLock<Subscribers>,
}

impl<A: BlockArchive> Blockchain<A> {
    /// Creates a chain positioned at the genesis tip.
    ///
    /// Producer keys and the chain address are decoded here, so a
    /// misconfigured node fails at construction rather than at first use.
    /// Call [`Blockchain::start`] to load the archived tip.
    pub fn new(
        config: BlockchainConfig,
        genesis: Genesis,
        archive: A,
        minter: Arc<dyn BlockMinter>,
        options: ChainOptions,
    ) -> Result<Self, ChainError> {
        let producer_keys = config.producer_keys()?;
        let chain_address = match config.address.trim() {
            "" => None,
            s => Some(
                Address::from_hex(s).map_err(|_| ConfigError::InvalidAddress(s.to_string()))?,
            ),
        };
        let tip = TipInfo::genesis(&genesis);

        Ok(Self {
            config,
            genesis: Arc::new(genesis),
            archive,
            minter,
            validator: options.validator,
            metrics: options.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            producer_keys,
            chain_address,
            state: RwLock::new(ChainState { tip, paused: false }),
            commit_lock: Mutex::new(()),
            subscribers: RwLock::new(Subscribers::default()),
        })
    }

    /// Starts the archive and loads the tip from it.
    pub fn start(&self) -> Result<(), ChainError> {
        let _commit = self.commit_lock.lock();
        self.archive.start()?;
        let tip = self.tip_info(self.archive.height()?)?;
        info!(height = tip.height, hash = %tip.hash, "blockchain started");
        self.state.write().tip = tip;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), ChainError> {
        let _commit = self.commit_lock.lock();
        self.archive.stop()?;
        info!("blockchain stopped");
        Ok(())
    }

    /// Pauses or resumes block commits.
    pub fn pause(&self, pause: bool) {
        self.state.write().paused = pause;
    }

    pub fn chain_id(&self) -> u32 {
        self.config.id
    }

    pub fn evm_network_id(&self) -> u32 {
        self.config.evm_network_id
    }

    pub fn chain_address(&self) -> Option<Address> {
        self.chain_address
    }

    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn tip_height(&self) -> u64 {
        self.state.read().tip.height
    }

    pub fn tip_hash(&self) -> Hash256 {
        self.state.read().tip.hash
    }

    pub fn block_header_by_height(&self, height: u64) -> Result<Header, ChainError> {
        Ok(self.archive.header_by_height(height)?)
    }

    pub fn block_header(&self, hash: &Hash256) -> Result<Header, ChainError> {
        Ok(self.archive.header(hash)?)
    }

    pub fn block_footer_by_height(&self, height: u64) -> Result<Footer, ChainError> {
        Ok(self.archive.footer_by_height(height)?)
    }

    /// Timestamp of the block at `height`; the genesis timestamp for 0.
    pub fn block_time(&self, height: u64) -> Result<u64, ChainError> {
        if height == 0 {
            return Ok(self.genesis.timestamp);
        }
        Ok(self.archive.header_by_height(height)?.timestamp)
    }

    /// Execution context at the current tip.
    pub fn context(&self) -> ExecutionContext {
        let tip = self.state.read().tip.clone();
        self.context_from(tip)
    }

    /// Execution context as of the block at `height`.
    pub fn context_at_height(&self, height: u64) -> Result<ExecutionContext, ChainError> {
        let _state = self.state.read();
        Ok(self.context_from(self.tip_info(height)?))
    }

    /// Checks that `block` can be committed on top of the current tip.
    ///
    /// Validation is read-only: it never changes the tip or the archive.
    pub fn validate_block(
        &self,
        block: &Block,
        opts: ValidationOptions,
    ) -> Result<(), ChainError> {
        let _timer = OpTimer::start(self.metrics.as_ref(), "ValidateBlock");
        let tip = self.state.read().tip.clone();

        let height = block.height();
        if height != 0 && height != tip.height + 1 {
            return Err(ChainError::InvalidTipHeight {
                got: height,
                expected: tip.height + 1,
            });
        }
        if block.prev_hash() != tip.hash {
            error!(
                height,
                prev_hash = %block.prev_hash(),
                expected_block_hash = %tip.hash,
                "Previous block hash doesn't match."
            );
            return Err(ChainError::InvalidBlock(format!(
                "wrong prev hash {}, expecting {}",
                block.prev_hash(),
                tip.hash
            )));
        }
        if block.base_fee().is_some() {
            verify_eip1559_header(&self.genesis, &tip, &block.header)?;
        }
        if !block.header.verify_signature() {
            return Err(ChainError::InvalidSignature(hex::encode(
                block.header.producer.as_bytes(),
            )));
        }
        block.verify_tx_root()?;
        if self.genesis.is_receipt_root_check_active(height) {
            block.verify_receipt_root()?;
        }

        let ctx = self.context_from(tip).with_block(BlockCtx {
            height,
            timestamp: block.timestamp(),
            gas_limit: self.genesis.block_gas_limit_by_height(height),
            producer: block.header.producer_address(),
            base_fee: block.base_fee(),
            excess_blob_gas: block.excess_blob_gas(),
            skip_sidecar_validation: opts.skip_sidecar_validation,
        });
        match &self.validator {
            Some(v) => Ok(v.validate(&ctx, block)?),
            None => Ok(()),
        }
    }

    /// Mints a block on top of the current tip.
    pub fn mint_new_block(&self, timestamp: u64, opts: MintOptions) -> Result<Block, ChainError> {
        let _timer = OpTimer::start(self.metrics.as_ref(), "MintNewBlock");
        let tip = self.state.read().tip.clone();

        let key = opts
            .producer_key
            .as_ref()
            .or_else(|| self.producer_keys.first())
            .ok_or(ChainError::NoProducerKey)?;
        let producer = key.public_key().address();
        let height = tip.height + 1;
        info!(height, minter = %producer, "Minting a new block.");

        let blob = &self.genesis.blockchain.blob;
        let block_ctx = BlockCtx {
            height,
            timestamp,
            gas_limit: self.genesis.block_gas_limit_by_height(height),
            producer,
            base_fee: Some(calc_base_fee(&self.genesis, &tip)),
            excess_blob_gas: calc_excess_blob_gas(
                tip.excess_blob_gas,
                tip.blob_gas_used,
                blob.target_blob_gas_per_block,
            ),
            skip_sidecar_validation: false,
        };
        let ctx = self.context_from(tip).with_block(block_ctx);

        let block = self.minter.mint(&ctx, key)?;
        self.metrics
            .set_block_metric("MintGas", block.gas_used() as f64);
        self.metrics
            .set_block_metric("MintActions", block.actions.len() as f64);
        Ok(block)
    }

    /// Durably appends `block` and advances the tip.
    ///
    /// Committing a block that is already archived succeeds without any
    /// effect. On success, subscribers are notified in registration order
    /// before this returns; their failures are logged and counted, never
    /// returned. Subscribers must not call back into `commit_block`.
    pub fn commit_block(&self, block: &Block) -> Result<(), ChainError> {
        let _commit = self.commit_lock.lock();
        let hash = block.hash();
        let ChainState { tip, paused } = self.state.read().clone();
        if paused {
            return Err(ChainError::Paused {
                height: block.height(),
                hash,
            });
        }
        let _timer = OpTimer::start(self.metrics.as_ref(), "CommitBlock");

        let height = block.height();
        let ctx = self.context_from(tip).with_block(BlockCtx {
            height,
            timestamp: block.timestamp(),
            gas_limit: self.genesis.block_gas_limit_by_height(height),
            producer: block.header.producer_address(),
            base_fee: block.base_fee(),
            excess_blob_gas: block.excess_blob_gas(),
            skip_sidecar_validation: false,
        });

        let started = Instant::now();
        let put = self.archive.put_block(&ctx, block);
        self.metrics
            .observe_duration("putBlock", started.elapsed().as_secs_f64());
        match put {
            Ok(()) => {}
            Err(ArchiveError::AlreadyExists(_)) => {
                debug!(height, "block already committed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.state.write().tip = TipInfo::from_header(&block.header);
        if height % 100 == 0 {
            info!(height, tip_hash = %hash, "Committed a block.");
        }
        self.metrics
            .set_block_metric("numActions", block.actions.len() as f64);
        if let Some(base_fee) = block.base_fee() {
            self.metrics.set_block_metric("baseFee", base_fee as f64);
        }
        self.metrics
            .set_block_metric("excessBlobGas", block.excess_blob_gas() as f64);
        self.metrics
            .set_block_metric("blobGasUsed", block.blob_gas_used() as f64);
        self.metrics
            .set_block_metric("gasUsed", block.gas_used() as f64);

        self.emit_to_subscribers(block);
        Ok(())
    }

    /// Registers a subscriber; registering the same one twice fails.
    pub fn add_subscriber(&self, s: Arc<dyn BlockSubscriber>) -> Result<(), ChainError> {
        info!(subscriber = s.name(), "Add a subscriber.");
        Ok(self.subscribers.write().add(s)?)
    }

    pub fn remove_subscriber(&self, s: &Arc<dyn BlockSubscriber>) -> Result<(), ChainError> {
        Ok(self.subscribers.write().remove(s)?)
    }

    fn emit_to_subscribers(&self, block: &Block) {
        let subscribers = self.subscribers.read().snapshot();
        for s in subscribers {
            if let Err(e) = s.receive_block(block) {
                warn!(
                    subscriber = s.name(),
                    height = block.height(),
                    error = %e,
                    "subscriber failed to handle block"
                );
                self.metrics.subscriber_failed(s.name());
            }
        }
    }

    fn tip_info(&self, height: u64) -> Result<TipInfo, ChainError> {
        if height == 0 {
            return Ok(TipInfo::genesis(&self.genesis));
        }
        let header = self.archive.header_by_height(height)?;
        Ok(TipInfo::from_header(&header))
    }

    fn context_from(&self, tip: TipInfo) -> ExecutionContext {
        ExecutionContext::new(
            BlockchainCtx {
                chain_id: self.config.id,
                evm_network_id: self.config.evm_network_id,
                tip,
            },
            Arc::clone(&self.genesis),
        )
    }
}

/// Number of blocks produced per producer address over `[start, end]`.
pub fn productivity<A: BlockArchive>(
    chain: &Blockchain<A>,
    start: u64,
    end: u64,
) -> Result<HashMap<Address, u64>, ChainError> {
    let mut stats = HashMap::new();
    for height in start..=end {
        let header = chain.block_header_by_height(height)?;
        *stats.entry(header.producer_address()).or_insert(0) += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::consensus::error::{ErrorKind, SubscriberError, ValidationError};
    use crate::consensus::minter::{PoolMinter, VecTxPool};
    use crate::storage::{KvBlockArchive, MemKvStore};
    use crate::test_utils::{build_chain, producer_key, test_action, test_genesis};
    use crate::types::{BlockBuilder, HASH_LEN};

    type TestChain = Blockchain<KvBlockArchive<Arc<MemKvStore>>>;

    fn dummy_hash(byte: u8) -> Hash256 {
        Hash256([byte; HASH_LEN])
    }

    fn config_with_key() -> BlockchainConfig {
        BlockchainConfig {
            producer_private_keys: hex::encode([7u8; 32]),
            ..BlockchainConfig::default()
        }
    }

    fn new_chain(options: ChainOptions) -> (TestChain, Arc<MemKvStore>) {
        let store = Arc::new(MemKvStore::new());
        let minter = Arc::new(PoolMinter::new(
            VecTxPool::new((0..10).map(test_action).collect()),
            2,
        ));
        let chain = Blockchain::new(
            config_with_key(),
            test_genesis(),
            KvBlockArchive::new(Arc::clone(&store)),
            minter,
            options,
        )
        .expect("construct chain");
        chain.start().expect("start chain");
        (chain, store)
    }

    #[derive(Default)]
    struct Recorder {
        heights: Mutex<Vec<u64>>,
    }

    impl BlockSubscriber for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn receive_block(&self, block: &Block) -> Result<(), SubscriberError> {
            self.heights.lock().expect("lock").push(block.height());
            Ok(())
        }
    }

    struct Failing;

    impl BlockSubscriber for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn receive_block(&self, _block: &Block) -> Result<(), SubscriberError> {
            Err(SubscriberError::Failed {
                name: "failing".into(),
                reason: "boom".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingMetrics {
        failures: Mutex<Vec<String>>,
        block: Mutex<HashMap<String, f64>>,
    }

    impl ChainMetrics for RecordingMetrics {
        fn observe_duration(&self, _topic: &str, _secs: f64) {}

        fn set_block_metric(&self, kind: &str, value: f64) {
            self.block.lock().expect("lock").insert(kind.to_string(), value);
        }

        fn subscriber_failed(&self, subscriber: &str) {
            self.failures
                .lock()
                .expect("lock")
                .push(subscriber.to_string());
        }
    }

    #[test]
    fn commit_from_genesis_notifies_once() {
        let (chain, _) = new_chain(ChainOptions::default());
        let recorder = Arc::new(Recorder::default());
        chain
            .add_subscriber(recorder.clone())
            .expect("add subscriber");
        assert_eq!(chain.tip_height(), 0);
        assert_eq!(chain.tip_hash(), chain.genesis().hash());

        let block = &build_chain(chain.genesis(), 1)[0];
        chain
            .validate_block(block, ValidationOptions::default())
            .expect("valid block");
        chain.commit_block(block).expect("commit");
        assert_eq!(chain.tip_height(), 1);
        assert_eq!(chain.tip_hash(), block.hash());

        // duplicate commit is a silent no-op
        chain.commit_block(block).expect("duplicate commit");
        assert_eq!(chain.tip_height(), 1);
        assert_eq!(*recorder.heights.lock().expect("lock"), vec![1]);
    }

    #[test]
    fn wrong_height_is_an_ordering_error() {
        let (chain, _) = new_chain(ChainOptions::default());
        let blocks = build_chain(chain.genesis(), 3);

        let err = chain
            .validate_block(&blocks[2], ValidationOptions::default())
            .expect_err("height 3 on tip 0");
        assert!(matches!(
            err,
            ChainError::InvalidTipHeight {
                got: 3,
                expected: 1
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Ordering);
        assert_eq!(chain.tip_height(), 0);
    }

    #[test]
    fn wrong_prev_hash_is_a_linkage_error() {
        let (chain, _) = new_chain(ChainOptions::default());
        let genesis = chain.genesis().clone();
        let block = BlockBuilder::new(1, dummy_hash(9), genesis.timestamp + 5)
            .base_fee(Some(genesis.blockchain.fee.initial_base_fee))
            .sign_and_build(&producer_key());

        let err = chain
            .validate_block(&block, ValidationOptions::default())
            .expect_err("unlinked block");
        assert!(matches!(err, ChainError::InvalidBlock(_)));
        assert_eq!(err.kind(), ErrorKind::Ordering);
    }

    #[test]
    fn tampered_blocks_fail_validity_checks() {
        let (chain, _) = new_chain(ChainOptions::default());
        let block = build_chain(chain.genesis(), 1).remove(0);

        let mut bad_fee = block.clone();
        bad_fee.header.base_fee = Some(1);
        assert!(matches!(
            chain.validate_block(&bad_fee, ValidationOptions::default()),
            Err(ChainError::Fee(_))
        ));

        let mut bad_sig = block.clone();
        bad_sig.header.signature.0[0] ^= 0xff;
        assert!(matches!(
            chain.validate_block(&bad_sig, ValidationOptions::default()),
            Err(ChainError::InvalidSignature(_))
        ));

        let mut bad_root = block;
        bad_root.actions.push(test_action(99));
        let err = chain
            .validate_block(&bad_root, ValidationOptions::default())
            .expect_err("tx root mismatch");
        assert!(matches!(err, ChainError::Root(_)));
        assert_eq!(err.kind(), ErrorKind::Validity);
    }

    #[test]
    fn external_validator_sees_block_context() {
        struct SidecarCheck;

        impl BlockValidator for SidecarCheck {
            fn validate(
                &self,
                ctx: &ExecutionContext,
                block: &Block,
            ) -> Result<(), ValidationError> {
                let bctx = ctx.block().ok_or(ValidationError::Invalid("no block ctx"))?;
                if bctx.height != block.height() {
                    return Err(ValidationError::Invalid("height mismatch"));
                }
                if !bctx.skip_sidecar_validation {
                    return Err(ValidationError::Invalid("sidecar required"));
                }
                Ok(())
            }
        }

        let (chain, _) = new_chain(ChainOptions {
            validator: Some(Arc::new(SidecarCheck)),
            ..ChainOptions::default()
        });
        let block = &build_chain(chain.genesis(), 1)[0];

        assert!(matches!(
            chain.validate_block(block, ValidationOptions::default()),
            Err(ChainError::Validation(_))
        ));
        chain
            .validate_block(
                block,
                ValidationOptions {
                    skip_sidecar_validation: true,
                },
            )
            .expect("validator accepts");
    }

    #[test]
    fn paused_chain_rejects_commits() {
        let (chain, _) = new_chain(ChainOptions::default());
        let block = &build_chain(chain.genesis(), 1)[0];

        chain.pause(true);
        let err = chain.commit_block(block).expect_err("paused");
        assert!(matches!(err, ChainError::Paused { height: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Operational);
        assert_eq!(chain.tip_height(), 0);

        chain.pause(false);
        chain.commit_block(block).expect("commit after resume");
        assert_eq!(chain.tip_height(), 1);
    }

    #[test]
    fn mint_validate_commit_loop() {
        let (chain, _) = new_chain(ChainOptions::default());
        let genesis_ts = chain.genesis().timestamp;

        for i in 1..=3u64 {
            let block = chain
                .mint_new_block(genesis_ts + 5 * i, MintOptions::default())
                .expect("mint");
            assert_eq!(block.height(), i);
            chain
                .validate_block(&block, ValidationOptions::default())
                .expect("minted block validates");
            chain.commit_block(&block).expect("commit");
        }

        assert_eq!(chain.tip_height(), 3);
        assert_eq!(chain.block_time(0).expect("genesis time"), genesis_ts);
        assert_eq!(chain.block_time(2).expect("time"), genesis_ts + 10);

        let stats = productivity(&chain, 1, 3).expect("productivity");
        assert_eq!(stats.get(&producer_key().public_key().address()), Some(&3));
    }

    #[test]
    fn mint_key_selection() {
        let other = PrivateKey::from_bytes(&[8u8; 32]).expect("key");
        let (chain, _) = new_chain(ChainOptions::default());

        let block = chain
            .mint_new_block(1, MintOptions::default())
            .expect("mint with configured key");
        assert_eq!(block.header.producer, producer_key().public_key());

        let block = chain
            .mint_new_block(
                1,
                MintOptions {
                    producer_key: Some(other.clone()),
                },
            )
            .expect("mint with explicit key");
        assert_eq!(block.header.producer, other.public_key());

        let keyless = Blockchain::new(
            BlockchainConfig::default(),
            test_genesis(),
            KvBlockArchive::new(MemKvStore::new()),
            Arc::new(PoolMinter::new(VecTxPool::default(), 1)),
            ChainOptions::default(),
        )
        .expect("construct");
        assert!(matches!(
            keyless.mint_new_block(1, MintOptions::default()),
            Err(ChainError::NoProducerKey)
        ));
    }

    #[test]
    fn subscriber_failures_are_logged_and_counted() {
        let metrics = Arc::new(RecordingMetrics::default());
        let (chain, _) = new_chain(ChainOptions {
            metrics: Some(metrics.clone()),
            ..ChainOptions::default()
        });
        let recorder = Arc::new(Recorder::default());
        chain.add_subscriber(Arc::new(Failing)).expect("add failing");
        chain
            .add_subscriber(recorder.clone())
            .expect("add recorder");

        let block = &build_chain(chain.genesis(), 1)[0];
        chain.commit_block(block).expect("commit despite subscriber");

        assert_eq!(*metrics.failures.lock().expect("lock"), vec!["failing"]);
        assert_eq!(*recorder.heights.lock().expect("lock"), vec![1]);
        assert_eq!(
            metrics.block.lock().expect("lock").get("gasUsed"),
            Some(&(block.gas_used() as f64))
        );
    }

    #[test]
    fn subscribers_can_read_the_new_tip() {
        use std::sync::{Weak, mpsc};
        use std::thread;
        use std::time::Duration;

        #[derive(Default)]
        struct TipReader {
            chain: Mutex<Weak<TestChain>>,
            seen: Mutex<Vec<(u64, u64, Hash256)>>,
        }

        impl BlockSubscriber for TipReader {
            fn name(&self) -> &str {
                "tip-reader"
            }

            fn receive_block(&self, block: &Block) -> Result<(), SubscriberError> {
                let Some(chain) = self.chain.lock().expect("lock").upgrade() else {
                    return Ok(());
                };
                let tip = (chain.tip_height(), chain.context().tip().height, chain.tip_hash());
                assert_eq!(tip.2, block.hash());
                self.seen.lock().expect("lock").push(tip);
                Ok(())
            }
        }

        let (chain, _) = new_chain(ChainOptions::default());
        let chain = Arc::new(chain);
        let reader = Arc::new(TipReader::default());
        *reader.chain.lock().expect("lock") = Arc::downgrade(&chain);
        chain.add_subscriber(reader.clone()).expect("add reader");

        let blocks = build_chain(chain.genesis(), 2);
        let (tx, rx) = mpsc::channel();
        let committer = Arc::clone(&chain);
        thread::spawn(move || {
            for b in &blocks {
                committer.commit_block(b).expect("commit");
            }
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("commit returns while a subscriber reads the tip");
        let seen = reader.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].0, seen[0].1), (1, 1));
        assert_eq!((seen[1].0, seen[1].1), (2, 2));
    }

    #[test]
    fn subscriber_registration_rules() {
        let (chain, _) = new_chain(ChainOptions::default());
        let s: Arc<dyn BlockSubscriber> = Arc::new(Recorder::default());

        chain.add_subscriber(Arc::clone(&s)).expect("add");
        assert!(matches!(
            chain.add_subscriber(Arc::clone(&s)),
            Err(ChainError::Subscriber(SubscriberError::AlreadyRegistered))
        ));
        chain.remove_subscriber(&s).expect("remove");
        assert!(matches!(
            chain.remove_subscriber(&s),
            Err(ChainError::Subscriber(SubscriberError::NotRegistered))
        ));
    }

    #[test]
    fn storage_failure_leaves_tip_and_subscribers_untouched() {
        let (chain, store) = new_chain(ChainOptions::default());
        let recorder = Arc::new(Recorder::default());
        chain
            .add_subscriber(recorder.clone())
            .expect("add subscriber");
        let block = &build_chain(chain.genesis(), 1)[0];

        store.fail_writes(true);
        let err = chain.commit_block(block).expect_err("store failure");
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(chain.tip_height(), 0);
        assert!(recorder.heights.lock().expect("lock").is_empty());
    }

    #[test]
    fn restart_reloads_tip_from_archive() {
        let (chain, store) = new_chain(ChainOptions::default());
        let blocks = build_chain(chain.genesis(), 2);
        for b in &blocks {
            chain.commit_block(b).expect("commit");
        }
        chain.stop().expect("stop");

        let restarted = Blockchain::new(
            config_with_key(),
            test_genesis(),
            KvBlockArchive::new(store),
            Arc::new(PoolMinter::new(VecTxPool::default(), 1)),
            ChainOptions::default(),
        )
        .expect("construct");
        assert_eq!(restarted.tip_height(), 0);
        restarted.start().expect("start");
        assert_eq!(restarted.tip_height(), 2);
        assert_eq!(restarted.tip_hash(), blocks[1].hash());

        let ctx = restarted.context_at_height(1).expect("context at 1");
        assert_eq!(ctx.tip().hash, blocks[0].hash());
        let ctx = restarted.context_at_height(0).expect("context at 0");
        assert_eq!(ctx.tip().hash, restarted.genesis().hash());
        assert_eq!(restarted.context().tip().height, 2);
    }

    #[test]
    fn invalid_configuration_fails_construction() {
        let cfg = BlockchainConfig {
            producer_private_keys: "nothex".into(),
            ..BlockchainConfig::default()
        };
        let result = Blockchain::new(
            cfg,
            test_genesis(),
            KvBlockArchive::new(MemKvStore::new()),
            Arc::new(PoolMinter::new(VecTxPool::default(), 1)),
            ChainOptions::default(),
        );
        assert!(matches!(result, Err(ChainError::Config(_))));

        let cfg = BlockchainConfig {
            address: "0x1234".into(),
            ..BlockchainConfig::default()
        };
        let result = Blockchain::new(
            cfg,
            test_genesis(),
            KvBlockArchive::new(MemKvStore::new()),
            Arc::new(PoolMinter::new(VecTxPool::default(), 1)),
            ChainOptions::default(),
        );
        assert!(matches!(
            result,
            Err(ChainError::Config(ConfigError::InvalidAddress(_)))
        ));
    }
}
