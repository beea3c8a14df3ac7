mod memory;
mod rpc;

pub use memory::*;
pub use rpc::*;

use crate::history::UtxoSet;
use crate::types::{BlockHeaderInfo, ChainBlockRef};
use bitcoincore_rpc::bitcoin::{BlockHash, Transaction, Txid};
use std::collections::HashMap;
use std::sync::Arc;
use txh_util::AddressHash;

/// Read access to the block chain. Implementations must give a consistent
/// view for the duration of one history query.
pub trait ChainStore: Send + Sync {
    fn get_chain_tip(&self) -> Result<BlockHash, String>;
    fn get_genesis_anchor_hash(&self) -> Result<BlockHash, String>;
    fn get_genesis_utxo(&self, address: &AddressHash) -> Result<UtxoSet, String>;

    // Ok(None) when the store does not know the hash
    fn get_block_header(&self, hash: &BlockHash) -> Result<Option<BlockHeaderInfo>, String>;
    fn get_block(&self, hash: &BlockHash) -> Result<Option<ChainBlockRef>, String>;
}

pub trait Mempool: Send + Sync {
    fn get_mempool_txs(&self) -> Result<HashMap<Txid, Transaction>, String>;
}

/// Admission of new transactions. The error carries the validation failure.
pub trait TxSubmitter: Send + Sync {
    fn submit_transaction(&self, txid: &Txid, tx: &Transaction) -> Result<(), String>;
}

pub type ChainStoreRef = Arc<Box<dyn ChainStore>>;
pub type MempoolRef = Arc<Box<dyn Mempool>>;
pub type TxSubmitterRef = Arc<Box<dyn TxSubmitter>>;

// Shared handles, one store can back all three roles

impl<T: ChainStore + ?Sized> ChainStore for Arc<T> {
    fn get_chain_tip(&self) -> Result<BlockHash, String> {
        (**self).get_chain_tip()
    }

    fn get_genesis_anchor_hash(&self) -> Result<BlockHash, String> {
        (**self).get_genesis_anchor_hash()
    }

    fn get_genesis_utxo(&self, address: &AddressHash) -> Result<UtxoSet, String> {
        (**self).get_genesis_utxo(address)
    }

    fn get_block_header(&self, hash: &BlockHash) -> Result<Option<BlockHeaderInfo>, String> {
        (**self).get_block_header(hash)
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Option<ChainBlockRef>, String> {
        (**self).get_block(hash)
    }
}

impl<T: Mempool + ?Sized> Mempool for Arc<T> {
    fn get_mempool_txs(&self) -> Result<HashMap<Txid, Transaction>, String> {
        (**self).get_mempool_txs()
    }
}

impl<T: TxSubmitter + ?Sized> TxSubmitter for Arc<T> {
    fn submit_transaction(&self, txid: &Txid, tx: &Transaction) -> Result<(), String> {
        (**self).submit_transaction(txid, tx)
    }
}
