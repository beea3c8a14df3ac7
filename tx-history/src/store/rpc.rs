use super::{ChainStore, ChainStoreRef, Mempool, MempoolRef, TxSubmitter, TxSubmitterRef};
use crate::history::UtxoSet;
use crate::types::{BlockHeaderInfo, ChainBlock, ChainBlockRef};
use bitcoincore_rpc::bitcoin::{BlockHash, Transaction, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use txh_util::AddressHash;

// bitcoind: RPC_INVALID_ADDRESS_OR_KEY, returned for unknown blocks and txs
const RPC_NOT_FOUND: i32 = -5;

/// Chain store, mempool and submitter backed by a bitcoind node.
///
/// Headers and blocks are cached by hash, which is safe across reorgs since a
/// hash always names the same content.
pub struct BTCRpcStore {
    rpc_url: String,
    auth: Auth,
    client: RwLock<Option<Arc<Client>>>,

    header_cache: Cache<BlockHash, BlockHeaderInfo>,
    block_cache: Cache<BlockHash, ChainBlockRef>,
    genesis_hash: RwLock<Option<BlockHash>>,
}

impl BTCRpcStore {
    pub fn new(rpc_url: String, auth: Auth, block_cache_size: u64) -> Self {
        // The client is created on demand, bitcoind may not be up yet and the
        // auth cookie may not exist
        let header_cache = Cache::builder()
            .max_capacity(block_cache_size.saturating_mul(64))
            .build();
        let block_cache = Cache::builder().max_capacity(block_cache_size).build();

        Self {
            rpc_url,
            auth,
            client: RwLock::new(None),
            header_cache,
            block_cache,
            genesis_hash: RwLock::new(None),
        }
    }

    pub fn into_refs(self) -> (ChainStoreRef, MempoolRef, TxSubmitterRef) {
        let store = Arc::new(self);
        (
            Arc::new(Box::new(store.clone()) as Box<dyn ChainStore>),
            Arc::new(Box::new(store.clone()) as Box<dyn Mempool>),
            Arc::new(Box::new(store) as Box<dyn TxSubmitter>),
        )
    }

    fn update_client(&self) -> Result<(), String> {
        let new_client = Client::new(&self.rpc_url, self.auth.clone()).map_err(|e| {
            let msg = format!("Failed to update BTC RPC client: {}", e);
            error!("{}", msg);
            msg
        })?;

        let mut write_guard = self.client.write().unwrap();
        *write_guard = Some(Arc::new(new_client));

        info!("BTC RPC client updated: {}", self.rpc_url);
        Ok(())
    }

    fn client(&self) -> Result<Arc<Client>, String> {
        {
            let read_guard = self.client.read().unwrap();
            if let Some(client) = &*read_guard {
                return Ok(client.clone());
            }
        }

        warn!("BTC RPC client is not initialized, attempting to update.");
        self.update_client()?;

        let read_guard = self.client.read().unwrap();
        match &*read_guard {
            Some(client) => Ok(client.clone()),
            None => Err("Failed to initialize BTC RPC client.".to_string()),
        }
    }

    fn is_auth_cookie(&self) -> bool {
        matches!(self.auth, Auth::CookieFile(_))
    }

    fn is_not_found(error: &bitcoincore_rpc::Error) -> bool {
        match error {
            bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(rpc_err)) => {
                rpc_err.code == RPC_NOT_FOUND
            }
            _ => false,
        }
    }

    fn on_error(&self, method: &str, error: bitcoincore_rpc::Error) -> String {
        // bitcoind may have restarted with a new auth cookie
        if let bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Transport(_)) =
            &error
        {
            if self.is_auth_cookie() {
                let _ = self.update_client();
            }
        }

        let msg = format!("{} failed: {}", method, error);
        error!("{}", msg);
        msg
    }

    fn fetch_header(&self, hash: &BlockHash) -> Result<Option<BlockHeaderInfo>, String> {
        let ret = match self.client()?.get_block_header_info(hash) {
            Ok(ret) => ret,
            Err(e) if Self::is_not_found(&e) => {
                debug!("Block header {} not found", hash);
                return Ok(None);
            }
            Err(e) => return Err(self.on_error("get_block_header_info", e)),
        };

        Ok(Some(BlockHeaderInfo {
            hash: ret.hash,
            prev_hash: ret.previous_block_hash,
            height: ret.height as u32,
        }))
    }

    fn fetch_block(&self, hash: &BlockHash) -> Result<Option<ChainBlockRef>, String> {
        let Some(header) = self.get_block_header(hash)? else {
            return Ok(None);
        };

        let block = match self.client()?.get_block(hash) {
            Ok(block) => block,
            Err(e) if Self::is_not_found(&e) => {
                warn!("Block {} has a header but no body", hash);
                return Ok(None);
            }
            Err(e) => return Err(self.on_error("get_block", e)),
        };

        Ok(Some(Arc::new(ChainBlock::Main {
            height: header.height,
            block,
        })))
    }
}

impl ChainStore for BTCRpcStore {
    fn get_chain_tip(&self) -> Result<BlockHash, String> {
        self.client()?
            .get_best_block_hash()
            .map_err(|e| self.on_error("get_best_block_hash", e))
    }

    fn get_genesis_anchor_hash(&self) -> Result<BlockHash, String> {
        if let Some(hash) = *self.genesis_hash.read().unwrap() {
            return Ok(hash);
        }

        let hash = self
            .client()?
            .get_block_hash(0)
            .map_err(|e| self.on_error("get_block_hash", e))?;
        *self.genesis_hash.write().unwrap() = Some(hash);

        info!("Genesis block hash: {}", hash);
        Ok(hash)
    }

    // The genesis coinbase can not be spent, nothing seeds the fold
    fn get_genesis_utxo(&self, _address: &AddressHash) -> Result<UtxoSet, String> {
        Ok(UtxoSet::new())
    }

    fn get_block_header(&self, hash: &BlockHash) -> Result<Option<BlockHeaderInfo>, String> {
        if let Some(header) = self.header_cache.get(hash) {
            return Ok(Some(header));
        }

        let header = self.fetch_header(hash)?;
        if let Some(header) = &header {
            self.header_cache.insert(*hash, header.clone());
        }

        Ok(header)
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Option<ChainBlockRef>, String> {
        if let Some(block) = self.block_cache.get(hash) {
            return Ok(Some(block));
        }

        let block = self.fetch_block(hash)?;
        if let Some(block) = &block {
            self.block_cache.insert(*hash, block.clone());
        }

        Ok(block)
    }
}

impl Mempool for BTCRpcStore {
    fn get_mempool_txs(&self) -> Result<HashMap<Txid, Transaction>, String> {
        let client = self.client()?;
        let txids = client
            .get_raw_mempool()
            .map_err(|e| self.on_error("get_raw_mempool", e))?;

        let mut txs = HashMap::with_capacity(txids.len());
        for txid in txids {
            match client.get_raw_transaction(&txid, None) {
                Ok(tx) => {
                    txs.insert(txid, tx);
                }
                Err(e) if Self::is_not_found(&e) => {
                    // Mined or evicted between the two calls
                    debug!("Mempool transaction {} is gone", txid);
                }
                Err(e) => return Err(self.on_error("get_raw_transaction", e)),
            }
        }

        debug!("Loaded {} mempool transactions", txs.len());
        Ok(txs)
    }
}

impl TxSubmitter for BTCRpcStore {
    fn submit_transaction(&self, txid: &Txid, tx: &Transaction) -> Result<(), String> {
        let accepted = self
            .client()?
            .send_raw_transaction(tx)
            .map_err(|e| self.on_error("send_raw_transaction", e))?;

        if accepted != *txid {
            let msg = format!("Node accepted {} as {}", txid, accepted);
            error!("{}", msg);
            return Err(msg);
        }

        Ok(())
    }
}
