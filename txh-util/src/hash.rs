use bitcoincore_rpc::bitcoin::hashes::{self, Hash, sha256};
use bitcoincore_rpc::bitcoin::{Address, Network, Script, ScriptBuf};
use std::str::FromStr;

hashes::hash_newtype! {
    /// Identity of an address inside the history engine: the hash of the
    /// output script that pays it.
    pub struct AddressHash(sha256::Hash);
}

pub trait ToAddressHash {
    fn to_address_hash(&self) -> AddressHash;
}

impl ToAddressHash for Script {
    fn to_address_hash(&self) -> AddressHash {
        // Same as Electrum's script hash: sha256 of the script bytes, then reversed
        let mut result = sha256::Hash::hash(self.as_bytes()).to_byte_array();
        result.reverse();

        AddressHash::from_byte_array(result)
    }
}

impl ToAddressHash for ScriptBuf {
    fn to_address_hash(&self) -> AddressHash {
        self.as_script().to_address_hash()
    }
}

pub fn address_string_to_address_hash(
    address: &str,
    network: &Network,
) -> Result<AddressHash, String> {
    let addr =
        Address::from_str(address).map_err(|e| format!("Invalid address {}: {}", address, e))?;
    let addr = addr
        .require_network(*network)
        .map_err(|e| format!("Address network mismatch for {}: {}", address, e))?;

    Ok(addr.script_pubkey().to_address_hash())
}

pub fn parse_address_hash(s: &str) -> Result<AddressHash, String> {
    AddressHash::from_str(s).map_err(|e| format!("Invalid address hash {}: {}", s, e))
}

// Accepts either a hex address hash or a bitcoin address string
pub fn parse_address_hash_any(s: &str, network: &Network) -> Result<AddressHash, String> {
    if let Ok(hash) = parse_address_hash(s) {
        return Ok(hash);
    }

    address_string_to_address_hash(s, network)
}
