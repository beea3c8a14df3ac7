use bitcoincore_rpc::bitcoin::{OutPoint, Transaction, Txid};
use std::collections::HashMap;
use txh_util::{AddressHash, ToAddressHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtxoValue {
    pub address: AddressHash,
    pub value: u64, // in Satoshi
}

/// The unspent outputs visible to one history fold.
///
/// Every outpoint in the set was produced by a seeding or folded transaction
/// and has not been consumed by a later folded transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UtxoValue>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoValue> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn insert(&mut self, outpoint: OutPoint, value: UtxoValue) -> Option<UtxoValue> {
        self.entries.insert(outpoint, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoValue)> {
        self.entries.iter()
    }

    pub fn balance(&self, address: &AddressHash) -> u64 {
        self.entries
            .values()
            .filter(|utxo| utxo.address == *address)
            .map(|utxo| utxo.value)
            .sum()
    }

    /// Spends every outpoint `tx` consumes and adds every spendable output it
    /// creates. Must run at most once per transaction within a fold.
    pub fn apply_transaction(&mut self, txid: &Txid, tx: &Transaction) {
        for input in &tx.input {
            self.entries.remove(&input.previous_output);
        }

        for (n, output) in tx.output.iter().enumerate() {
            // OP_RETURN outputs can never be spent
            if output.script_pubkey.is_op_return() {
                continue;
            }

            let outpoint = OutPoint {
                txid: *txid,
                vout: n as u32,
            };
            let value = UtxoValue {
                address: output.script_pubkey.to_address_hash(),
                value: output.value.to_sat(),
            };
            self.entries.insert(outpoint, value);
        }
    }

    pub fn restrict_to_address(&mut self, address: &AddressHash) {
        self.entries.retain(|_, utxo| utxo.address == *address);
    }
}

impl FromIterator<(OutPoint, UtxoValue)> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = (OutPoint, UtxoValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for UtxoSet {
    type Item = (OutPoint, UtxoValue);
    type IntoIter = std::collections::hash_map::IntoIter<OutPoint, UtxoValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// Relevance predicates

pub fn is_incoming(address: &AddressHash, tx: &Transaction) -> bool {
    tx.output
        .iter()
        .any(|output| output.script_pubkey.to_address_hash() == *address)
}

// Inputs whose outpoint is unknown to the set are simply not ours
pub fn is_outgoing(address: &AddressHash, tx: &Transaction, utxo: &UtxoSet) -> bool {
    tx.input.iter().any(|input| {
        utxo.get(&input.previous_output)
            .is_some_and(|value| value.address == *address)
    })
}

pub fn pays_only_to(address: &AddressHash, tx: &Transaction) -> bool {
    !tx.output.is_empty()
        && tx
            .output
            .iter()
            .all(|output| output.script_pubkey.to_address_hash() == *address)
}
