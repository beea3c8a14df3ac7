// Fixtures shared by the unit tests of this crate

use crate::history::UtxoSet;
use crate::store::MemoryChainStore;
use crate::types::ChainBlock;
use bitcoincore_rpc::bitcoin::absolute::LockTime;
use bitcoincore_rpc::bitcoin::block::{Header, Version as BlockVersion};
use bitcoincore_rpc::bitcoin::hashes::Hash;
use bitcoincore_rpc::bitcoin::transaction::Version;
use bitcoincore_rpc::bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, PubkeyHash, ScriptBuf, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
};

pub fn script_for(n: u8) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([n; 20]))
}

pub fn op_return_script() -> ScriptBuf {
    // OP_RETURN <0x00>
    ScriptBuf::from_bytes(vec![0x6a, 0x01, 0x00])
}

pub fn txid_from_byte(b: u8) -> Txid {
    Txid::from_byte_array([b; 32])
}

fn outputs(outputs: &[(&ScriptBuf, u64)]) -> Vec<TxOut> {
    outputs
        .iter()
        .map(|(script, value)| TxOut {
            value: Amount::from_sat(*value),
            script_pubkey: (*script).clone(),
        })
        .collect()
}

// `tag` ends up in the coinbase script so equal outputs still give distinct txids
pub fn coinbase_tx(tag: u32, outs: &[(&ScriptBuf, u64)]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(tag.to_le_bytes().to_vec()),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs(outs),
    }
}

pub fn spend_tx(inputs: &[OutPoint], outs: &[(&ScriptBuf, u64)]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs(outs),
    }
}

pub fn make_block(prev: BlockHash, txdata: Vec<Transaction>, nonce: u32) -> Block {
    let mut block = Block {
        header: Header {
            version: BlockVersion::TWO,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_700_000_000 + nonce,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce,
        },
        txdata,
    };

    if let Some(root) = block.compute_merkle_root() {
        block.header.merkle_root = root;
    }

    block
}

pub fn genesis_block() -> ChainBlock {
    let coinbase = coinbase_tx(u32::MAX, &[(&script_for(0), 50)]);
    ChainBlock::Main {
        height: 0,
        block: make_block(BlockHash::all_zeros(), vec![coinbase], 0),
    }
}

/// A linear chain on top of `genesis_block()`.
pub struct TestChain {
    pub store: MemoryChainStore,
    pub height: u32,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_genesis_utxo(UtxoSet::new())
    }

    pub fn with_genesis_utxo(utxo: UtxoSet) -> Self {
        Self {
            store: MemoryChainStore::new(genesis_block(), utxo),
            height: 0,
        }
    }

    // Mines a block holding a fresh coinbase to nobody in particular plus `txs`
    pub fn mine(&mut self, txs: Vec<Transaction>) -> BlockHash {
        self.height += 1;

        let mut txdata = vec![coinbase_tx(self.height, &[(&script_for(0xff), 50)])];
        txdata.extend(txs);

        let block = make_block(self.store.tip(), txdata, self.height);
        self.store
            .push_block(ChainBlock::Main {
                height: self.height,
                block,
            })
            .unwrap()
    }

    pub fn mine_empty(&mut self, count: usize) {
        for _ in 0..count {
            self.mine(Vec::new());
        }
    }

    pub fn mine_boundary(&mut self) -> BlockHash {
        self.height += 1;

        let mut bytes = [0xb0u8; 32];
        bytes[..4].copy_from_slice(&self.height.to_le_bytes());
        let boundary = ChainBlock::Boundary {
            hash: BlockHash::from_byte_array(bytes),
            prev_hash: Some(self.store.tip()),
            height: self.height,
        };
        self.store.push_block(boundary).unwrap()
    }
}
