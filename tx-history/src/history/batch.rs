use super::utxo::{UtxoSet, is_incoming, is_outgoing, pays_only_to};
use crate::error::{HistoryError, HistoryResult};
use crate::types::HistoryEntry;
use bitcoincore_rpc::bitcoin::{Transaction, Txid};
use std::collections::HashMap;
use txh_util::AddressHash;

// A transaction of a batch together with its id
pub type BatchTx<'a> = (Txid, &'a Transaction);

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

/// Orders a batch so that every transaction comes after the batch members
/// whose outputs it spends. Transactions without such a relation keep their
/// relative order. Returns indices into `batch`.
pub fn sort_batch(batch: &[BatchTx<'_>]) -> HistoryResult<Vec<usize>> {
    let mut positions = HashMap::with_capacity(batch.len());
    for (index, (txid, _)) in batch.iter().enumerate() {
        if positions.insert(*txid, index).is_some() {
            let msg = format!("Duplicate transaction {} in batch", txid);
            warn!("{}", msg);
            return Err(HistoryError::MalformedBatch(msg));
        }
    }

    // Intra-batch parents of every transaction, in input order
    let parents: Vec<Vec<usize>> = batch
        .iter()
        .map(|(_, tx)| {
            let mut deps = Vec::new();
            for input in &tx.input {
                if let Some(&parent) = positions.get(&input.previous_output.txid) {
                    if !deps.contains(&parent) {
                        deps.push(parent);
                    }
                }
            }
            deps
        })
        .collect();

    // Iterative depth-first walk, a batch may hold long spend chains
    let mut state = vec![VisitState::Unvisited; batch.len()];
    let mut order = Vec::with_capacity(batch.len());
    for root in 0..batch.len() {
        if state[root] != VisitState::Unvisited {
            continue;
        }

        state[root] = VisitState::InProgress;
        let mut stack = vec![(root, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if next < parents[node].len() {
                top.1 += 1;

                let parent = parents[node][next];
                match state[parent] {
                    VisitState::Done => {}
                    VisitState::InProgress => {
                        let msg = format!(
                            "Dependency cycle between transactions {} and {}",
                            batch[node].0, batch[parent].0
                        );
                        warn!("{}", msg);
                        return Err(HistoryError::MalformedBatch(msg));
                    }
                    VisitState::Unvisited => {
                        state[parent] = VisitState::InProgress;
                        stack.push((parent, 0));
                    }
                }
            } else {
                state[node] = VisitState::Done;
                order.push(node);
                stack.pop();
            }
        }
    }

    Ok(order)
}

/// Scans a batch for transactions that pay `address` or spend its outputs,
/// applying each relevant one to `utxo`.
///
/// The returned entries are in application order and carry no block height.
/// A pure self-payment yields an incoming entry followed by an outgoing one.
/// If the batch cannot be ordered nothing is applied and `utxo` is untouched.
pub fn get_related_txs(
    address: &AddressHash,
    batch: &[BatchTx<'_>],
    utxo: &mut UtxoSet,
) -> HistoryResult<Vec<HistoryEntry>> {
    let order = sort_batch(batch)?;

    let mut entries = Vec::new();
    for index in order {
        let (txid, tx) = batch[index];

        let incoming = is_incoming(address, tx);
        let outgoing = is_outgoing(address, tx, utxo);
        if !incoming && !outgoing {
            continue;
        }

        utxo.apply_transaction(&txid, tx);
        utxo.restrict_to_address(address);

        let entry = HistoryEntry {
            txid,
            tx: tx.clone(),
            is_outgoing: outgoing,
            block_height: None,
        };

        if outgoing && pays_only_to(address, tx) {
            debug!("Self transfer {} for {}", txid, address);
            entries.push(HistoryEntry {
                is_outgoing: false,
                ..entry.clone()
            });
        }
        entries.push(entry);
    }

    Ok(entries)
}
