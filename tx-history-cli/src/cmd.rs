use bitcoincore_rpc::bitcoin::address::NetworkUnchecked;
use bitcoincore_rpc::bitcoin::{Address, Network};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use txh_util::{AddressHash, TX_HISTORY_SERVICE_HTTP_PORT, ToAddressHash};

#[derive(Parser)]
#[command(name = "tx-history-cli")]
#[command(about = "Bitcoin address transaction history JSON-RPC client")]
pub struct Cli {
    #[arg(short, long, default_value_t = format!("http://127.0.0.1:{}", TX_HISTORY_SERVICE_HTTP_PORT))]
    pub url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get current network type
    NetworkType,

    /// Stop the tx history service
    Stop,

    /// Get the transaction history of an address or address hash
    History {
        #[arg(value_name = "USER_ID")]
        user: String,

        /// Resume from a checkpoint file written by an earlier query
        #[arg(long, value_name = "FILE")]
        checkpoint: Option<PathBuf>,

        /// Write the checkpoint of this answer to a file
        #[arg(long, value_name = "FILE")]
        save_checkpoint: Option<PathBuf>,
    },

    /// Submit a raw transaction
    Submit {
        #[arg(value_name = "TX_HEX")]
        tx: String,
    },
}

#[derive(Debug)]
pub enum UserId {
    Address(Address<NetworkUnchecked>),
    AddressHash(AddressHash),
}

impl FromStr for UserId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // An address first, a 64 char hex hash otherwise
        if let Ok(addr) = Address::<NetworkUnchecked>::from_str(s) {
            Ok(UserId::Address(addr))
        } else if let Ok(hash) = s.parse::<AddressHash>() {
            Ok(UserId::AddressHash(hash))
        } else {
            Err(format!("Invalid user ID: {}", s))
        }
    }
}

impl UserId {
    pub fn to_address_hash(&self, network: Network) -> Result<AddressHash, String> {
        match self {
            UserId::Address(addr) => {
                let checked_addr = addr
                    .clone()
                    .require_network(network)
                    .map_err(|e| format!("Address network mismatch: {}", e))?;

                Ok(checked_addr.script_pubkey().to_address_hash())
            }
            UserId::AddressHash(hash) => Ok(*hash),
        }
    }
}
