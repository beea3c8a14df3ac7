use super::cmd::{Cli, Commands, UserId};
use crate::client::RpcClient;
use bitcoincore_rpc::bitcoin::Network;
use std::path::Path;
use std::str::FromStr;
use tx_history::{HistoryCheckpointParam, TxHistoryItem, TxHistoryResult};

pub struct TxHistoryClientService {
    network: Network,
    client: RpcClient,
}

impl TxHistoryClientService {
    pub async fn new(url: &str) -> Result<Self, String> {
        println!("Connecting to Tx History Service at {}", url);
        let client = RpcClient::new(url)?;

        // Try get network type to verify connection
        let network_type = client.get_network_type().await?;
        let network = Network::from_str(&network_type).map_err(|e| {
            let msg = format!("Invalid network type received from server: {}", e);
            log::error!("{}", msg);
            msg
        })?;

        println!("Connected to network type: {}", network);

        Ok(Self { network, client })
    }

    pub async fn process_command(&self, cli: Cli) -> Result<(), String> {
        match cli.command {
            Commands::NetworkType => {
                let network_type = self.client.get_network_type().await?;
                println!("Network Type: {}", network_type);
            }
            Commands::Stop => {
                self.client.stop().await?;
                println!("Stop requested.");
            }
            Commands::History {
                user,
                checkpoint,
                save_checkpoint,
            } => {
                let user_id = UserId::from_str(&user)?;
                let address = user_id.to_address_hash(self.network)?;

                let checkpoint = match checkpoint {
                    Some(path) => Some(load_checkpoint(&path)?),
                    None => None,
                };

                let result = self.client.get_tx_history(address, checkpoint).await?;
                HistoryFormatter::print_history(&result);

                if let Some(path) = save_checkpoint {
                    write_checkpoint(&path, &result.checkpoint())?;
                    println!("Checkpoint written to {}", path.display());
                }
            }
            Commands::Submit { tx } => {
                let decoded = tx_history::decode_tx(&tx)?;
                let txid = decoded.compute_txid();
                self.client.save_tx(txid, tx).await?;
                println!("Submitted transaction {}", txid);
            }
        }

        Ok(())
    }
}

fn load_checkpoint(path: &Path) -> Result<HistoryCheckpointParam, String> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        let msg = format!("Failed to read checkpoint {}: {}", path.display(), e);
        log::error!("{}", msg);
        msg
    })?;

    serde_json::from_str(&data).map_err(|e| {
        let msg = format!("Failed to parse checkpoint {}: {}", path.display(), e);
        log::error!("{}", msg);
        msg
    })
}

fn write_checkpoint(path: &Path, checkpoint: &HistoryCheckpointParam) -> Result<(), String> {
    let data = serde_json::to_string_pretty(checkpoint).map_err(|e| e.to_string())?;
    std::fs::write(path, data).map_err(|e| {
        let msg = format!("Failed to write checkpoint {}: {}", path.display(), e);
        log::error!("{}", msg);
        msg
    })
}

struct HistoryFormatter;

impl HistoryFormatter {
    fn print_history(result: &TxHistoryResult) {
        println!(
            "Cached up to block {} ({} entries)",
            result.last_cached_hash, result.cached_count
        );

        if result.history.is_empty() {
            println!("No transactions found.");
            return;
        }

        println!("\n┌──────────────────────────────────────────────────────────────────┬───────────┬──────────┐");
        println!("│ Txid                                                             │ Height    │ Dir      │");
        println!("├──────────────────────────────────────────────────────────────────┼───────────┼──────────┤");

        for item in &result.history {
            println!(
                "│ {} │ {:>9} │ {:<8} │",
                item.txid,
                Self::format_height(item),
                if item.is_outgoing { "out" } else { "in" }
            );
        }

        println!("└──────────────────────────────────────────────────────────────────┴───────────┴──────────┘");
    }

    fn format_height(item: &TxHistoryItem) -> String {
        match item.block_height {
            Some(height) => height.to_string(),
            None => "pending".to_string(),
        }
    }
}
