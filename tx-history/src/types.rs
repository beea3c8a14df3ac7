use crate::history::UtxoSet;
use bitcoincore_rpc::bitcoin::hashes::Hash;
use bitcoincore_rpc::bitcoin::{Block, BlockHash, Transaction, Txid};
use std::sync::Arc;

// Block height of the block that confirmed a transaction
pub type ChainDifficulty = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderInfo {
    pub hash: BlockHash,
    pub prev_hash: Option<BlockHash>,
    pub height: ChainDifficulty,
}

/// One element of the chain as handed out by a store.
///
/// Boundary markers occupy a slot in the chain (they have a hash and link to
/// a predecessor) but carry no transactions, so history derivation skips them.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainBlock {
    Main {
        height: ChainDifficulty,
        block: Block,
    },
    Boundary {
        hash: BlockHash,
        prev_hash: Option<BlockHash>,
        height: ChainDifficulty,
    },
}

impl ChainBlock {
    pub fn block_hash(&self) -> BlockHash {
        match self {
            ChainBlock::Main { block, .. } => block.block_hash(),
            ChainBlock::Boundary { hash, .. } => *hash,
        }
    }

    pub fn height(&self) -> ChainDifficulty {
        match self {
            ChainBlock::Main { height, .. } => *height,
            ChainBlock::Boundary { height, .. } => *height,
        }
    }

    pub fn prev_hash(&self) -> Option<BlockHash> {
        match self {
            ChainBlock::Main { block, .. } => {
                let prev = block.header.prev_blockhash;
                if prev == BlockHash::all_zeros() {
                    None
                } else {
                    Some(prev)
                }
            }
            ChainBlock::Boundary { prev_hash, .. } => *prev_hash,
        }
    }

    pub fn header_info(&self) -> BlockHeaderInfo {
        BlockHeaderInfo {
            hash: self.block_hash(),
            prev_hash: self.prev_hash(),
            height: self.height(),
        }
    }
}

pub type ChainBlockRef = Arc<ChainBlock>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub txid: Txid,
    pub tx: Transaction,
    pub is_outgoing: bool,

    // None while the transaction is only in the mempool
    pub block_height: Option<ChainDifficulty>,
}

impl HistoryEntry {
    pub fn is_pending(&self) -> bool {
        self.block_height.is_none()
    }
}

/// A resumable point for history queries: everything up to and including
/// `block_hash` has already been folded into `utxo` and `history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCheckpoint {
    pub block_hash: BlockHash,
    pub utxo: UtxoSet,
    pub history: Vec<HistoryEntry>,
}

impl HistoryCheckpoint {
    pub fn new(block_hash: BlockHash, utxo: UtxoSet) -> Self {
        Self {
            block_hash,
            utxo,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryAnswer {
    pub last_cached_hash: BlockHash,
    pub cached_count: usize,
    pub cached_utxo: UtxoSet,

    // Oldest first, pending mempool entries last
    pub history: Vec<HistoryEntry>,
}

impl HistoryAnswer {
    pub fn cached_history(&self) -> &[HistoryEntry] {
        &self.history[..self.cached_count]
    }

    pub fn confirmed_history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().filter(|entry| !entry.is_pending())
    }

    pub fn pending_history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().filter(|entry| entry.is_pending())
    }

    pub fn checkpoint(&self) -> HistoryCheckpoint {
        HistoryCheckpoint::new(self.last_cached_hash, self.cached_utxo.clone())
            .with_history(self.cached_history().to_vec())
    }
}
