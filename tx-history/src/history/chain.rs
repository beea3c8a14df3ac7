use super::batch::{BatchTx, get_related_txs};
use super::utxo::UtxoSet;
use crate::error::HistoryResult;
use crate::types::{ChainBlock, HistoryEntry};
use std::ops::Deref;
use txh_util::AddressHash;

/// Derives the history of `address` over `blocks`, starting from an arbitrary
/// `utxo` that is first narrowed down to the outputs of `address`.
pub fn derive_addr_history<B: Deref<Target = ChainBlock>>(
    address: &AddressHash,
    utxo: &mut UtxoSet,
    blocks: &[B],
) -> HistoryResult<Vec<HistoryEntry>> {
    utxo.restrict_to_address(address);
    derive_addr_history_partial(address, Vec::new(), utxo, blocks)
}

/// Continues `history` over `blocks` in the order given. Boundary markers are
/// skipped, entries of a main block are tagged with that block's height.
pub fn derive_addr_history_partial<B: Deref<Target = ChainBlock>>(
    address: &AddressHash,
    mut history: Vec<HistoryEntry>,
    utxo: &mut UtxoSet,
    blocks: &[B],
) -> HistoryResult<Vec<HistoryEntry>> {
    for chain_block in blocks {
        let (height, block) = match &**chain_block {
            ChainBlock::Main { height, block } => (*height, block),
            ChainBlock::Boundary { hash, .. } => {
                trace!("Skip boundary block {}", hash);
                continue;
            }
        };

        let batch: Vec<BatchTx<'_>> = block
            .txdata
            .iter()
            .map(|tx| (tx.compute_txid(), tx))
            .collect();

        let entries = get_related_txs(address, &batch, utxo)?;
        if !entries.is_empty() {
            debug!(
                "Block {} at height {} has {} history entries for {}",
                block.block_hash(),
                height,
                entries.len(),
                address
            );
        }

        history.extend(entries.into_iter().map(|entry| HistoryEntry {
            block_height: Some(height),
            ..entry
        }));
    }

    Ok(history)
}
