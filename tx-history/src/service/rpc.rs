use crate::history::{UtxoSet, UtxoValue};
use crate::types::{HistoryAnswer, HistoryCheckpoint, HistoryEntry};
use bitcoincore_rpc::bitcoin::consensus::encode::{deserialize_hex, serialize_hex};
use bitcoincore_rpc::bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use jsonrpc_core::Result as JsonResult;
use jsonrpc_derive::rpc;
use serde::{Deserialize, Serialize};
use txh_util::AddressHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoItem {
    pub txid: Txid,
    pub vout: u32,
    pub address: AddressHash,
    pub value: u64, // in Satoshi
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHistoryItem {
    pub txid: Txid,

    // Consensus encoded transaction, hex
    pub tx: String,
    pub is_outgoing: bool,

    // None for mempool transactions
    pub block_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCheckpointParam {
    pub block_hash: BlockHash,
    pub utxo: Vec<UtxoItem>,
    pub history: Vec<TxHistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTxHistoryParams {
    pub address: AddressHash,

    // Optional: resume from the checkpoint of an earlier answer
    pub checkpoint: Option<HistoryCheckpointParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHistoryResult {
    pub last_cached_hash: BlockHash,
    pub cached_count: usize,
    pub cached_utxo: Vec<UtxoItem>,
    pub history: Vec<TxHistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTxParams {
    pub txid: Txid,

    // Consensus encoded transaction, hex
    pub tx: String,
}

pub fn encode_tx(tx: &Transaction) -> String {
    serialize_hex(tx)
}

pub fn decode_tx(hex: &str) -> Result<Transaction, String> {
    deserialize_hex::<Transaction>(hex).map_err(|e| format!("Invalid transaction hex: {}", e))
}

fn utxo_items(utxo: &UtxoSet) -> Vec<UtxoItem> {
    let mut items: Vec<UtxoItem> = utxo
        .iter()
        .map(|(outpoint, value)| UtxoItem {
            txid: outpoint.txid,
            vout: outpoint.vout,
            address: value.address,
            value: value.value,
        })
        .collect();

    // HashMap order is random, keep answers byte-stable
    items.sort_by_key(|item| (item.txid, item.vout));
    items
}

fn utxo_set(items: &[UtxoItem]) -> UtxoSet {
    items
        .iter()
        .map(|item| {
            (
                OutPoint::new(item.txid, item.vout),
                UtxoValue {
                    address: item.address,
                    value: item.value,
                },
            )
        })
        .collect()
}

impl From<&HistoryEntry> for TxHistoryItem {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            txid: entry.txid,
            tx: encode_tx(&entry.tx),
            is_outgoing: entry.is_outgoing,
            block_height: entry.block_height,
        }
    }
}

impl TryFrom<&TxHistoryItem> for HistoryEntry {
    type Error = String;

    fn try_from(item: &TxHistoryItem) -> Result<Self, Self::Error> {
        let tx = decode_tx(&item.tx)?;
        if tx.compute_txid() != item.txid {
            return Err(format!(
                "History item {} does not match its transaction {}",
                item.txid,
                tx.compute_txid()
            ));
        }

        Ok(HistoryEntry {
            txid: item.txid,
            tx,
            is_outgoing: item.is_outgoing,
            block_height: item.block_height,
        })
    }
}

impl From<&HistoryCheckpoint> for HistoryCheckpointParam {
    fn from(checkpoint: &HistoryCheckpoint) -> Self {
        Self {
            block_hash: checkpoint.block_hash,
            utxo: utxo_items(&checkpoint.utxo),
            history: checkpoint.history.iter().map(TxHistoryItem::from).collect(),
        }
    }
}

impl TryFrom<&HistoryCheckpointParam> for HistoryCheckpoint {
    type Error = String;

    fn try_from(param: &HistoryCheckpointParam) -> Result<Self, Self::Error> {
        let history = param
            .history
            .iter()
            .map(HistoryEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryCheckpoint::new(param.block_hash, utxo_set(&param.utxo)).with_history(history))
    }
}

impl From<&HistoryAnswer> for TxHistoryResult {
    fn from(answer: &HistoryAnswer) -> Self {
        Self {
            last_cached_hash: answer.last_cached_hash,
            cached_count: answer.cached_count,
            cached_utxo: utxo_items(&answer.cached_utxo),
            history: answer.history.iter().map(TxHistoryItem::from).collect(),
        }
    }
}

impl TxHistoryResult {
    // Checkpoint to pass back on the next query
    pub fn checkpoint(&self) -> HistoryCheckpointParam {
        HistoryCheckpointParam {
            block_hash: self.last_cached_hash,
            utxo: self.cached_utxo.clone(),
            history: self.history[..self.cached_count.min(self.history.len())].to_vec(),
        }
    }
}

#[rpc(server)]
pub trait TxHistoryRpc {
    /// Gets the current bitcoin chain network type
    #[rpc(name = "get_network_type")]
    fn get_network_type(&self) -> JsonResult<String>;

    /// Gets the transaction history of an address, confirmed first then pending
    #[rpc(name = "get_tx_history")]
    fn get_tx_history(&self, params: GetTxHistoryParams) -> JsonResult<TxHistoryResult>;

    /// Submits a transaction to the node
    #[rpc(name = "save_tx")]
    fn save_tx(&self, params: SaveTxParams) -> JsonResult<()>;

    #[rpc(name = "stop")]
    fn stop(&self) -> JsonResult<()>;
}
