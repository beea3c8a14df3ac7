use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use txh_util::{BTCConfig, DEFAULT_SECURITY_DEPTH, TX_HISTORY_SERVICE_HTTP_PORT};

fn default_security_depth() -> usize {
    DEFAULT_SECURITY_DEPTH
}

fn default_batch_size() -> usize {
    64
}

fn default_include_pending() -> bool {
    true
}

fn default_block_cache_size() -> u64 {
    1024
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    // Most recent blocks that are always recomputed and never cached
    #[serde(default = "default_security_depth")]
    pub security_depth: usize,

    // Blocks fetched together before being folded
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    // Merge mempool transactions into every answer
    #[serde(default = "default_include_pending")]
    pub include_pending: bool,

    // Max blocks kept in memory by the bitcoind backed store
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            security_depth: default_security_depth(),
            batch_size: default_batch_size(),
            include_pending: default_include_pending(),
            block_cache_size: default_block_cache_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcServer {
    #[serde(default = "default_rpc_port")]
    pub port: u16,
}

fn default_rpc_port() -> u16 {
    TX_HISTORY_SERVICE_HTTP_PORT
}

impl Default for RpcServer {
    fn default() -> Self {
        RpcServer {
            port: default_rpc_port(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxHistoryConfig {
    #[serde(default)]
    pub btc: BTCConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub rpc_server: RpcServer,
}

impl TxHistoryConfig {
    pub fn load(root_dir: &Path) -> Result<Self, String> {
        let path = root_dir.join("config.toml");
        if !path.exists() {
            let default_config = TxHistoryConfig::default();
            info!(
                "Config file {} does not exist. Using default configuration.",
                path.display()
            );
            if let Ok(s) = toml::to_string_pretty(&default_config) {
                info!("Default config: {}", s);
            }
            return Ok(default_config);
        }

        info!("Loading config from {}", path.display());
        let config_data = std::fs::read_to_string(&path).map_err(|e| {
            let msg = format!("Failed to read config file {}: {}", path.display(), e);
            error!("{}", msg);
            msg
        })?;

        Self::parse(&config_data).map_err(|e| {
            let msg = format!("Failed to parse config file {}: {}", path.display(), e);
            error!("{}", msg);
            msg
        })
    }

    pub fn parse(config_data: &str) -> Result<Self, String> {
        let config: TxHistoryConfig = toml::from_str(config_data).map_err(|e| e.to_string())?;
        if config.history.batch_size == 0 {
            return Err("history.batch_size must be greater than zero".to_string());
        }

        Ok(config)
    }
}

pub type TxHistoryConfigRef = Arc<TxHistoryConfig>;
