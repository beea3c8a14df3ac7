use super::{ChainStore, ChainStoreRef, Mempool, MempoolRef, TxSubmitter, TxSubmitterRef};
use crate::history::UtxoSet;
use crate::types::{BlockHeaderInfo, ChainBlock, ChainBlockRef};
use bitcoincore_rpc::bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use txh_util::AddressHash;

struct MemoryChainState {
    blocks: HashMap<BlockHash, ChainBlockRef>,
    tip: BlockHash,
    mempool: HashMap<Txid, Transaction>,
}

/// Chain store, mempool and submitter kept entirely in memory.
///
/// Clones share the same state, so a handle kept by the caller can extend the
/// chain while services hold the others.
#[derive(Clone)]
pub struct MemoryChainStore {
    genesis_hash: BlockHash,
    genesis_utxo: Arc<UtxoSet>,
    state: Arc<RwLock<MemoryChainState>>,
}

impl MemoryChainStore {
    pub fn new(genesis: ChainBlock, genesis_utxo: UtxoSet) -> Self {
        let genesis_hash = genesis.block_hash();
        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, Arc::new(genesis));

        let state = MemoryChainState {
            blocks,
            tip: genesis_hash,
            mempool: HashMap::new(),
        };

        Self {
            genesis_hash,
            genesis_utxo: Arc::new(genesis_utxo),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn tip(&self) -> BlockHash {
        self.state.read().unwrap().tip
    }

    pub fn block_count(&self) -> usize {
        self.state.read().unwrap().blocks.len()
    }

    // Append a block on top of the current tip
    pub fn push_block(&self, block: ChainBlock) -> Result<BlockHash, String> {
        let mut state = self.state.write().unwrap();
        if block.prev_hash() != Some(state.tip) {
            let msg = format!(
                "Block {} does not extend tip {}",
                block.block_hash(),
                state.tip
            );
            error!("{}", msg);
            return Err(msg);
        }

        // Confirmed transactions leave the mempool
        if let ChainBlock::Main { block, .. } = &block {
            for tx in &block.txdata {
                state.mempool.remove(&tx.compute_txid());
            }
        }

        let hash = block.block_hash();
        state.blocks.insert(hash, Arc::new(block));
        state.tip = hash;

        Ok(hash)
    }

    // Store a block without moving the tip, e.g. to build a fork
    pub fn insert_block(&self, block: ChainBlock) -> BlockHash {
        let hash = block.block_hash();
        self.state
            .write()
            .unwrap()
            .blocks
            .insert(hash, Arc::new(block));
        hash
    }

    pub fn remove_block(&self, hash: &BlockHash) -> Option<ChainBlockRef> {
        self.state.write().unwrap().blocks.remove(hash)
    }

    pub fn set_tip(&self, hash: BlockHash) {
        self.state.write().unwrap().tip = hash;
    }

    pub fn add_mempool_tx(&self, tx: Transaction) -> Txid {
        let txid = tx.compute_txid();
        self.state.write().unwrap().mempool.insert(txid, tx);
        txid
    }

    pub fn as_chain_store(&self) -> ChainStoreRef {
        Arc::new(Box::new(self.clone()) as Box<dyn ChainStore>)
    }

    pub fn as_mempool(&self) -> MempoolRef {
        Arc::new(Box::new(self.clone()) as Box<dyn Mempool>)
    }

    pub fn as_submitter(&self) -> TxSubmitterRef {
        Arc::new(Box::new(self.clone()) as Box<dyn TxSubmitter>)
    }
}

impl ChainStore for MemoryChainStore {
    fn get_chain_tip(&self) -> Result<BlockHash, String> {
        Ok(self.tip())
    }

    fn get_genesis_anchor_hash(&self) -> Result<BlockHash, String> {
        Ok(self.genesis_hash)
    }

    fn get_genesis_utxo(&self, address: &AddressHash) -> Result<UtxoSet, String> {
        let mut utxo = self.genesis_utxo.as_ref().clone();
        utxo.restrict_to_address(address);
        Ok(utxo)
    }

    fn get_block_header(&self, hash: &BlockHash) -> Result<Option<BlockHeaderInfo>, String> {
        let state = self.state.read().unwrap();
        Ok(state.blocks.get(hash).map(|block| block.header_info()))
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Option<ChainBlockRef>, String> {
        let state = self.state.read().unwrap();
        Ok(state.blocks.get(hash).cloned())
    }
}

impl Mempool for MemoryChainStore {
    fn get_mempool_txs(&self) -> Result<HashMap<Txid, Transaction>, String> {
        Ok(self.state.read().unwrap().mempool.clone())
    }
}

impl TxSubmitter for MemoryChainStore {
    // Minimal admission: no duplicates, no coinbase-like txs, no double spend
    // against the mempool
    fn submit_transaction(&self, txid: &Txid, tx: &Transaction) -> Result<(), String> {
        let mut state = self.state.write().unwrap();
        if state.mempool.contains_key(txid) {
            return Err(format!("Transaction {} already in mempool", txid));
        }

        if tx.input.is_empty() || tx.is_coinbase() {
            return Err(format!("Transaction {} spends nothing", txid));
        }

        let double_spend = {
            let spent: HashSet<&OutPoint> = state
                .mempool
                .values()
                .flat_map(|pending| pending.input.iter().map(|input| &input.previous_output))
                .collect();
            tx.input
                .iter()
                .map(|input| input.previous_output)
                .find(|outpoint| spent.contains(outpoint))
        };
        if let Some(outpoint) = double_spend {
            return Err(format!("Transaction {} double spends {}", txid, outpoint));
        }

        state.mempool.insert(*txid, tx.clone());
        info!("Accepted transaction {} into memory mempool", txid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::test_util::*;
    use bitcoincore_rpc::bitcoin::hashes::Hash;

    #[test]
    fn test_push_block_requires_tip_parent() {
        let store = MemoryChainStore::new(genesis_block(), UtxoSet::new());
        let genesis = store.tip();

        let block1 = make_block(genesis, vec![coinbase_tx(1, &[(&script_for(1), 1)])], 1);
        let hash1 = store
            .push_block(ChainBlock::Main { height: 1, block: block1 })
            .unwrap();
        assert_eq!(store.tip(), hash1);

        let orphan = make_block(genesis, vec![coinbase_tx(2, &[(&script_for(1), 1)])], 2);
        assert!(store.push_block(ChainBlock::Main { height: 1, block: orphan }).is_err());
        assert_eq!(store.tip(), hash1);

        let header = store.get_block_header(&hash1).unwrap().unwrap();
        assert_eq!(header.prev_hash, Some(genesis));
        assert_eq!(header.height, 1);

        let missing = BlockHash::from_byte_array([0x42; 32]);
        assert!(store.get_block_header(&missing).unwrap().is_none());
        assert!(store.get_block(&missing).unwrap().is_none());
    }

    #[test]
    fn test_submit_and_confirm() {
        let store = MemoryChainStore::new(genesis_block(), UtxoSet::new());
        let funding = coinbase_tx(1, &[(&script_for(1), 10)]);
        let tx = spend_tx(
            &[OutPoint::new(funding.compute_txid(), 0)],
            &[(&script_for(2), 10)],
        );
        let txid = tx.compute_txid();

        store.submit_transaction(&txid, &tx).unwrap();
        assert!(store.submit_transaction(&txid, &tx).is_err());

        let conflict = spend_tx(
            &[OutPoint::new(funding.compute_txid(), 0)],
            &[(&script_for(3), 10)],
        );
        assert!(store.submit_transaction(&conflict.compute_txid(), &conflict).is_err());
        assert!(store.submit_transaction(&funding.compute_txid(), &funding).is_err());
        assert_eq!(store.get_mempool_txs().unwrap().len(), 1);

        let block = make_block(store.tip(), vec![funding, tx], 1);
        store.push_block(ChainBlock::Main { height: 1, block }).unwrap();
        assert!(store.get_mempool_txs().unwrap().is_empty());
    }

    #[test]
    fn test_genesis_utxo_is_restricted() {
        let alice = script_for(1);
        let bob = script_for(2);
        let seed = coinbase_tx(0, &[(&alice, 5), (&bob, 7)]);
        let mut utxo = UtxoSet::new();
        utxo.apply_transaction(&seed.compute_txid(), &seed);

        let store = MemoryChainStore::new(genesis_block(), utxo);
        let restricted = store
            .get_genesis_utxo(&txh_util::ToAddressHash::to_address_hash(&bob))
            .unwrap();
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted.iter().next().unwrap().1.value, 7);
    }
}
