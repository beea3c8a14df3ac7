use super::batch::{BatchTx, get_related_txs};
use super::chain::derive_addr_history_partial;
use super::utxo::UtxoSet;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::store::{ChainStoreRef, MempoolRef, TxSubmitterRef};
use crate::types::{ChainBlockRef, ChainDifficulty, HistoryAnswer, HistoryCheckpoint, HistoryEntry};
use bitcoincore_rpc::bitcoin::{BlockHash, Transaction, Txid};
use rayon::prelude::*;
use std::sync::Arc;
use txh_util::AddressHash;

/// What the rest of the node can ask about address histories.
pub trait TxHistory: Send + Sync {
    /// Full history of `address` from genesis, or from `checkpoint` when one
    /// from an earlier answer is supplied.
    fn get_tx_history(
        &self,
        address: &AddressHash,
        checkpoint: Option<HistoryCheckpoint>,
    ) -> HistoryResult<HistoryAnswer>;

    fn save_tx(&self, txid: &Txid, tx: &Transaction) -> HistoryResult<()>;
}

pub type TxHistoryRef = Arc<Box<dyn TxHistory>>;

#[derive(Clone)]
pub struct TxHistoryService {
    config: HistoryConfig,
    store: ChainStoreRef,
    mempool: MempoolRef,
    submitter: TxSubmitterRef,
}

impl TxHistoryService {
    pub fn new(
        config: HistoryConfig,
        store: ChainStoreRef,
        mempool: MempoolRef,
        submitter: TxSubmitterRef,
    ) -> Self {
        info!(
            "Tx history service: security depth {}, batch size {}, pending merge {}",
            config.security_depth, config.batch_size, config.include_pending
        );

        Self {
            config,
            store,
            mempool,
            submitter,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    fn store_error(e: String) -> HistoryError {
        error!("Chain store error: {}", e);
        HistoryError::Store(e)
    }

    // Hashes strictly above `anchor` up to and including `tip`, oldest first.
    // Heights must strictly decrease along the walk, so a store whose links
    // loop back is reported instead of walked forever.
    fn walk_chain(&self, tip: BlockHash, anchor: BlockHash) -> HistoryResult<Vec<BlockHash>> {
        let mut hashes = Vec::new();
        let mut current = tip;
        let mut child_height: Option<ChainDifficulty> = None;
        while current != anchor {
            let header = self
                .store
                .get_block_header(&current)
                .map_err(Self::store_error)?
                .ok_or_else(|| {
                    let msg = format!("Missing header for block {}", current);
                    error!("{}", msg);
                    HistoryError::StoreInconsistency(msg)
                })?;

            if let Some(child_height) = child_height {
                if header.height >= child_height {
                    let msg = format!(
                        "Block {} at height {} is not below its child at height {}",
                        current, header.height, child_height
                    );
                    error!("{}", msg);
                    return Err(HistoryError::StoreInconsistency(msg));
                }
            }
            child_height = Some(header.height);

            hashes.push(current);
            current = header.prev_hash.ok_or_else(|| {
                let msg = format!(
                    "Reached first block {} without meeting anchor {}",
                    current, anchor
                );
                error!("{}", msg);
                HistoryError::StoreInconsistency(msg)
            })?;
        }

        hashes.reverse();
        Ok(hashes)
    }

    fn load_blocks(&self, hashes: &[BlockHash]) -> HistoryResult<Vec<ChainBlockRef>> {
        hashes
            .par_iter()
            .map(|hash| {
                let block = self
                    .store
                    .get_block(hash)
                    .map_err(Self::store_error)?
                    .ok_or_else(|| {
                        let msg = format!("Missing block {}", hash);
                        error!("{}", msg);
                        HistoryError::StoreInconsistency(msg)
                    })?;

                if block.block_hash() != *hash {
                    let msg = format!("Store returned block {} for {}", block.block_hash(), hash);
                    error!("{}", msg);
                    return Err(HistoryError::StoreInconsistency(msg));
                }

                Ok(block)
            })
            .collect()
    }

    // Folds the blocks of `hashes` in order, fetching `batch_size` at a time
    fn fold_segment(
        &self,
        address: &AddressHash,
        mut history: Vec<HistoryEntry>,
        utxo: &mut UtxoSet,
        hashes: &[BlockHash],
    ) -> HistoryResult<Vec<HistoryEntry>> {
        for chunk in hashes.chunks(self.config.batch_size.max(1)) {
            let blocks = self.load_blocks(chunk)?;
            history = derive_addr_history_partial(address, history, utxo, &blocks)?;
        }

        Ok(history)
    }

    fn pending_entries(
        &self,
        address: &AddressHash,
        utxo: &mut UtxoSet,
    ) -> HistoryResult<Vec<HistoryEntry>> {
        let mempool = self
            .mempool
            .get_mempool_txs()
            .map_err(Self::store_error)?;

        // Stable order first so repeated queries agree, then dependency order
        let mut batch: Vec<BatchTx<'_>> = mempool.iter().map(|(txid, tx)| (*txid, tx)).collect();
        batch.sort_by_key(|(txid, _)| *txid);

        get_related_txs(address, &batch, utxo)
    }
}

impl TxHistory for TxHistoryService {
    fn get_tx_history(
        &self,
        address: &AddressHash,
        checkpoint: Option<HistoryCheckpoint>,
    ) -> HistoryResult<HistoryAnswer> {
        let tip = self.store.get_chain_tip().map_err(Self::store_error)?;

        let (anchor, mut utxo, carried) = match checkpoint {
            Some(checkpoint) => (checkpoint.block_hash, checkpoint.utxo, checkpoint.history),
            None => {
                let anchor = self
                    .store
                    .get_genesis_anchor_hash()
                    .map_err(Self::store_error)?;
                let utxo = self
                    .store
                    .get_genesis_utxo(address)
                    .map_err(Self::store_error)?;
                (anchor, utxo, Vec::new())
            }
        };
        utxo.restrict_to_address(address);

        let hashes = self.walk_chain(tip, anchor)?;
        let split = hashes.len().saturating_sub(self.config.security_depth);
        let (cached_hashes, recent_hashes) = hashes.split_at(split);
        debug!(
            "History for {}: {} blocks above anchor {}, {} cached, {} recent",
            address,
            hashes.len(),
            anchor,
            cached_hashes.len(),
            recent_hashes.len()
        );

        let cached_history = self.fold_segment(address, carried, &mut utxo, cached_hashes)?;
        let cached_count = cached_history.len();
        let cached_utxo = utxo.clone();

        let mut history = self.fold_segment(address, cached_history, &mut utxo, recent_hashes)?;

        if self.config.include_pending {
            let pending = self.pending_entries(address, &mut utxo)?;
            history.extend(pending);
        }

        let last_cached_hash = cached_hashes.last().copied().unwrap_or(anchor);

        info!(
            "History for {}: {} entries, {} cached up to {}",
            address,
            history.len(),
            cached_count,
            last_cached_hash
        );

        Ok(HistoryAnswer {
            last_cached_hash,
            cached_count,
            cached_utxo,
            history,
        })
    }

    fn save_tx(&self, txid: &Txid, tx: &Transaction) -> HistoryResult<()> {
        let computed = tx.compute_txid();
        if computed != *txid {
            warn!("Transaction id mismatch: claimed {}, computed {}", txid, computed);
            return Err(HistoryError::SubmissionFailure { txid: *txid });
        }

        self.submitter.submit_transaction(txid, tx).map_err(|e| {
            warn!("Transaction {} was rejected: {}", txid, e);
            HistoryError::SubmissionFailure { txid: *txid }
        })?;

        info!("Transaction {} submitted", txid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::test_util::*;
    use crate::store::{ChainStore, MemoryChainStore};
    use crate::types::{BlockHeaderInfo, ChainBlock};
    use bitcoincore_rpc::bitcoin::OutPoint;
    use bitcoincore_rpc::bitcoin::hashes::Hash;
    use txh_util::ToAddressHash;

    fn service(chain: &TestChain, security_depth: usize) -> TxHistoryService {
        let config = HistoryConfig {
            security_depth,
            batch_size: 2,
            ..Default::default()
        };

        TxHistoryService::new(
            config,
            chain.store.as_chain_store(),
            chain.store.as_mempool(),
            chain.store.as_submitter(),
        )
    }

    #[test]
    fn test_receive_send_and_pending_receive() {
        let alice = script_for(1);
        let bob = script_for(2);
        let carol = script_for(3);
        let alice_hash = alice.to_address_hash();

        let seed = coinbase_tx(500, &[(&bob, 100)]);
        let mut genesis_utxo = UtxoSet::new();
        genesis_utxo.apply_transaction(&seed.compute_txid(), &seed);
        let mut chain = TestChain::with_genesis_utxo(genesis_utxo);

        let bob_to_alice = spend_tx(
            &[OutPoint::new(seed.compute_txid(), 0)],
            &[(&alice, 10), (&bob, 90)],
        );
        chain.mine(vec![bob_to_alice.clone()]);

        let alice_to_carol = spend_tx(
            &[OutPoint::new(bob_to_alice.compute_txid(), 0)],
            &[(&carol, 4), (&alice, 6)],
        );
        chain.mine(vec![alice_to_carol.clone()]);

        let pending = spend_tx(
            &[OutPoint::new(bob_to_alice.compute_txid(), 1)],
            &[(&alice, 10), (&bob, 80)],
        );
        chain.store.add_mempool_tx(pending.clone());

        let answer = service(&chain, 6).get_tx_history(&alice_hash, None).unwrap();
        assert_eq!(answer.history.len(), 3);

        assert_eq!(answer.history[0].txid, bob_to_alice.compute_txid());
        assert_eq!(answer.history[0].block_height, Some(1));
        assert!(!answer.history[0].is_outgoing);

        assert_eq!(answer.history[1].txid, alice_to_carol.compute_txid());
        assert_eq!(answer.history[1].block_height, Some(2));
        assert!(answer.history[1].is_outgoing);

        assert_eq!(answer.history[2].txid, pending.compute_txid());
        assert_eq!(answer.history[2].block_height, None);
        assert!(!answer.history[2].is_outgoing);

        // Whole chain is inside the security depth
        assert_eq!(answer.cached_count, 0);
        assert_eq!(answer.last_cached_hash, chain.store.get_genesis_anchor_hash().unwrap());
        assert!(answer.cached_utxo.is_empty());
        assert_eq!(answer.pending_history().count(), 1);
        assert_eq!(answer.confirmed_history().count(), 2);
    }

    #[test]
    fn test_security_depth_partition() {
        let alice = script_for(1);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();

        let first = coinbase_tx(100, &[(&alice, 5)]);
        chain.mine(vec![first.clone()]);
        chain.mine_empty(1);
        let third = chain.mine(Vec::new());
        let late = coinbase_tx(101, &[(&alice, 7)]);
        chain.mine(vec![late.clone()]);
        chain.mine_empty(1);

        let answer = service(&chain, 2).get_tx_history(&alice_hash, None).unwrap();
        assert_eq!(answer.last_cached_hash, third);
        assert_eq!(answer.cached_count, 1);
        assert_eq!(answer.cached_history()[0].txid, first.compute_txid());
        assert_eq!(answer.cached_utxo.balance(&alice_hash), 5);
        assert_eq!(answer.history.len(), 2);
        assert_eq!(answer.history[1].txid, late.compute_txid());
        assert_eq!(answer.history[1].block_height, Some(4));
    }

    #[test]
    fn test_checkpoint_resume_matches_full_query() {
        let alice = script_for(1);
        let carol = script_for(3);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();

        let receive = coinbase_tx(100, &[(&alice, 10)]);
        chain.mine(vec![receive.clone()]);
        let spend = spend_tx(
            &[OutPoint::new(receive.compute_txid(), 0)],
            &[(&carol, 4), (&alice, 6)],
        );
        chain.mine(vec![spend]);
        chain.mine_empty(3);

        let service = service(&chain, 2);
        let first = service.get_tx_history(&alice_hash, None).unwrap();
        assert_eq!(first.cached_count, 2);

        chain.mine(vec![coinbase_tx(102, &[(&alice, 1)])]);
        chain.mine_empty(1);

        let resumed = service
            .get_tx_history(&alice_hash, Some(first.checkpoint()))
            .unwrap();
        assert_eq!(resumed.history[..first.cached_count], first.history[..first.cached_count]);
        assert_eq!(resumed.history.len(), 3);

        let fresh = service.get_tx_history(&alice_hash, None).unwrap();
        assert_eq!(resumed, fresh);
    }

    #[test]
    fn test_boundary_blocks_are_walked_and_skipped() {
        let alice = script_for(1);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();

        chain.mine(vec![coinbase_tx(100, &[(&alice, 1)])]);
        chain.mine_boundary();
        chain.mine(vec![coinbase_tx(101, &[(&alice, 2)])]);

        let answer = service(&chain, 1).get_tx_history(&alice_hash, None).unwrap();
        let heights: Vec<_> = answer.history.iter().map(|e| e.block_height).collect();
        assert_eq!(heights, vec![Some(1), Some(3)]);
        assert_eq!(answer.cached_count, 1);
    }

    #[test]
    fn test_missing_header_is_store_inconsistency() {
        let alice = script_for(1);
        let mut chain = TestChain::new();
        chain.mine_empty(1);
        let second = chain.mine(Vec::new());
        chain.mine_empty(2);

        chain.store.remove_block(&second);

        let ret = service(&chain, 1).get_tx_history(&alice.to_address_hash(), None);
        assert!(matches!(ret, Err(HistoryError::StoreInconsistency(_))));
    }

    #[test]
    fn test_unknown_checkpoint_is_store_inconsistency() {
        let alice = script_for(1);
        let mut chain = TestChain::new();
        chain.mine_empty(3);

        let checkpoint = HistoryCheckpoint::new(BlockHash::from_byte_array([0x77; 32]), UtxoSet::new());
        let ret = service(&chain, 1).get_tx_history(&alice.to_address_hash(), Some(checkpoint));
        assert!(matches!(ret, Err(HistoryError::StoreInconsistency(_))));
    }

    #[test]
    fn test_looping_chain_links_are_store_inconsistency() {
        let alice = script_for(1);
        let chain = TestChain::new();

        let first = BlockHash::from_byte_array([0x11; 32]);
        let second = BlockHash::from_byte_array([0x22; 32]);
        chain.store.insert_block(ChainBlock::Boundary {
            hash: first,
            prev_hash: Some(second),
            height: 5,
        });
        chain.store.insert_block(ChainBlock::Boundary {
            hash: second,
            prev_hash: Some(first),
            height: 4,
        });
        chain.store.set_tip(first);
        assert_eq!(chain.store.block_count(), 3);

        let ret = service(&chain, 1).get_tx_history(&alice.to_address_hash(), None);
        assert!(matches!(ret, Err(HistoryError::StoreInconsistency(_))));
    }

    #[test]
    fn test_checkpoint_on_abandoned_fork_is_store_inconsistency() {
        let alice = script_for(1);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();
        let first = chain.mine(vec![coinbase_tx(100, &[(&alice, 10)])]);
        chain.mine_empty(3);

        let service = service(&chain, 1);
        let answer = service.get_tx_history(&alice_hash, None).unwrap();

        // A longer branch replaces everything above block 1
        let mut prev = first;
        for height in 2..=5u32 {
            let txdata = vec![coinbase_tx(500 + height, &[(&script_for(0xee), 1)])];
            let block = make_block(prev, txdata, 1000 + height);
            prev = chain.store.insert_block(ChainBlock::Main { height, block });
        }
        chain.store.set_tip(prev);

        let ret = service.get_tx_history(&alice_hash, Some(answer.checkpoint()));
        assert!(matches!(ret, Err(HistoryError::StoreInconsistency(_))));

        let fresh = service.get_tx_history(&alice_hash, None).unwrap();
        assert_eq!(fresh.history.len(), 1);
        assert_ne!(fresh.last_cached_hash, answer.last_cached_hash);
    }

    // Serves headers from `inner` but drops or swaps chosen block bodies
    struct FaultyChainStore {
        inner: MemoryChainStore,
        missing_body: Option<BlockHash>,
        swapped_body: Option<(BlockHash, BlockHash)>,
    }

    impl ChainStore for FaultyChainStore {
        fn get_chain_tip(&self) -> Result<BlockHash, String> {
            self.inner.get_chain_tip()
        }

        fn get_genesis_anchor_hash(&self) -> Result<BlockHash, String> {
            self.inner.get_genesis_anchor_hash()
        }

        fn get_genesis_utxo(&self, address: &AddressHash) -> Result<UtxoSet, String> {
            self.inner.get_genesis_utxo(address)
        }

        fn get_block_header(&self, hash: &BlockHash) -> Result<Option<BlockHeaderInfo>, String> {
            self.inner.get_block_header(hash)
        }

        fn get_block(&self, hash: &BlockHash) -> Result<Option<ChainBlockRef>, String> {
            if self.missing_body == Some(*hash) {
                return Ok(None);
            }

            match self.swapped_body {
                Some((from, to)) if from == *hash => self.inner.get_block(&to),
                _ => self.inner.get_block(hash),
            }
        }
    }

    fn faulty_service(chain: &TestChain, store: FaultyChainStore) -> TxHistoryService {
        TxHistoryService::new(
            HistoryConfig::default(),
            Arc::new(Box::new(store) as Box<dyn ChainStore>),
            chain.store.as_mempool(),
            chain.store.as_submitter(),
        )
    }

    #[test]
    fn test_missing_block_body_is_store_inconsistency() {
        let alice = script_for(1);
        let mut chain = TestChain::new();
        chain.mine(vec![coinbase_tx(100, &[(&alice, 10)])]);
        let second = chain.mine(Vec::new());
        chain.mine_empty(1);

        let store = FaultyChainStore {
            inner: chain.store.clone(),
            missing_body: Some(second),
            swapped_body: None,
        };
        assert!(store.get_block_header(&second).unwrap().is_some());

        let ret = faulty_service(&chain, store).get_tx_history(&alice.to_address_hash(), None);
        assert!(matches!(ret, Err(HistoryError::StoreInconsistency(_))));
    }

    #[test]
    fn test_block_under_wrong_hash_is_store_inconsistency() {
        let alice = script_for(1);
        let mut chain = TestChain::new();
        chain.mine(vec![coinbase_tx(100, &[(&alice, 10)])]);
        let second = chain.mine(Vec::new());
        let third = chain.mine(Vec::new());

        let store = FaultyChainStore {
            inner: chain.store.clone(),
            missing_body: None,
            swapped_body: Some((second, third)),
        };

        let ret = faulty_service(&chain, store).get_tx_history(&alice.to_address_hash(), None);
        assert!(matches!(ret, Err(HistoryError::StoreInconsistency(_))));
    }

    #[test]
    fn test_malformed_block_aborts_query() {
        let alice = script_for(1);
        let mut chain = TestChain::new();
        chain.mine(vec![coinbase_tx(100, &[(&alice, 10)])]);

        let duplicated = coinbase_tx(101, &[(&alice, 1)]);
        chain.mine(vec![duplicated.clone(), duplicated]);
        chain.mine_empty(1);

        let ret = service(&chain, 1).get_tx_history(&alice.to_address_hash(), None);
        assert!(matches!(ret, Err(HistoryError::MalformedBatch(_))));
    }

    #[test]
    fn test_repeated_query_is_identical() {
        let alice = script_for(1);
        let bob = script_for(2);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();

        let receive = coinbase_tx(100, &[(&alice, 10)]);
        chain.mine(vec![receive.clone()]);
        for i in 0..4u32 {
            chain.store.add_mempool_tx(coinbase_tx(200 + i, &[(&alice, 1), (&bob, 1)]));
        }

        let service = service(&chain, 1);
        let first = service.get_tx_history(&alice_hash, None).unwrap();
        let second = service.get_tx_history(&alice_hash, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.pending_history().count(), 4);
    }

    #[test]
    fn test_pending_chain_is_dependency_ordered() {
        let alice = script_for(1);
        let carol = script_for(3);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();
        chain.mine_empty(1);

        let parent = coinbase_tx(300, &[(&alice, 10)]);
        let child = spend_tx(&[OutPoint::new(parent.compute_txid(), 0)], &[(&carol, 10)]);
        chain.store.add_mempool_tx(child.clone());
        chain.store.add_mempool_tx(parent.clone());

        let answer = service(&chain, 1).get_tx_history(&alice_hash, None).unwrap();
        let pending: Vec<_> = answer.pending_history().map(|e| (e.txid, e.is_outgoing)).collect();
        assert_eq!(
            pending,
            vec![(parent.compute_txid(), false), (child.compute_txid(), true)]
        );
    }

    #[test]
    fn test_pending_merge_can_be_disabled() {
        let alice = script_for(1);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();
        chain.mine_empty(1);
        chain.store.add_mempool_tx(coinbase_tx(400, &[(&alice, 10)]));

        let config = HistoryConfig {
            include_pending: false,
            ..Default::default()
        };
        let service = TxHistoryService::new(
            config,
            chain.store.as_chain_store(),
            chain.store.as_mempool(),
            chain.store.as_submitter(),
        );

        let answer = service.get_tx_history(&alice_hash, None).unwrap();
        assert!(answer.history.is_empty());
    }

    #[test]
    fn test_save_tx_reaches_pending_history() {
        let alice = script_for(1);
        let carol = script_for(3);
        let alice_hash = alice.to_address_hash();
        let mut chain = TestChain::new();

        let receive = coinbase_tx(100, &[(&alice, 10)]);
        chain.mine(vec![receive.clone()]);

        let service = service(&chain, 1);
        let spend = spend_tx(&[OutPoint::new(receive.compute_txid(), 0)], &[(&carol, 10)]);
        let txid = spend.compute_txid();

        let wrong_id = txid_from_byte(0x55);
        assert_eq!(
            service.save_tx(&wrong_id, &spend),
            Err(HistoryError::SubmissionFailure { txid: wrong_id })
        );

        service.save_tx(&txid, &spend).unwrap();
        assert_eq!(
            service.save_tx(&txid, &spend),
            Err(HistoryError::SubmissionFailure { txid })
        );

        let answer = service.get_tx_history(&alice_hash, None).unwrap();
        let last = answer.history.last().unwrap();
        assert_eq!(last.txid, txid);
        assert!(last.is_outgoing);
        assert!(last.is_pending());
    }
}
