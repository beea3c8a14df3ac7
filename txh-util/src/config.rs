use bitcoincore_rpc::Auth;
use bitcoincore_rpc::bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BTCAuth {
    None,
    UserPass(String, String),
    CookieFile(PathBuf),
}

fn default_network() -> Network {
    Network::Bitcoin
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BTCConfig {
    #[serde(default = "default_network")]
    pub network: Network,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub rpc_url: Option<String>,

    #[serde(default)]
    pub auth: Option<BTCAuth>,
}

impl BTCConfig {
    pub fn network(&self) -> Network {
        self.network
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }

        let base_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        match self.network() {
            Network::Bitcoin => base_dir.join(".bitcoin"),
            Network::Testnet => base_dir.join(".bitcoin/testnet3"),
            Network::Testnet4 => base_dir.join(".bitcoin/testnet4"),
            Network::Regtest => base_dir.join(".bitcoin/regtest"),
            Network::Signet => base_dir.join(".bitcoin/signet"),
            _ => base_dir.join(".bitcoin"),
        }
    }

    pub fn rpc_url(&self) -> String {
        if let Some(ref url) = self.rpc_url {
            return url.clone();
        }

        // bitcoind default rpc ports
        let port = match self.network() {
            Network::Bitcoin => 8332,
            Network::Testnet => 18332,
            Network::Testnet4 => 48332,
            Network::Regtest => 18443,
            Network::Signet => 38332,
            _ => 8332,
        };

        format!("http://127.0.0.1:{}", port)
    }

    pub fn auth(&self) -> Auth {
        match self.auth {
            Some(BTCAuth::None) => Auth::None,
            Some(BTCAuth::UserPass(ref user, ref pass)) => Auth::UserPass(user.clone(), pass.clone()),
            Some(BTCAuth::CookieFile(ref path)) => Auth::CookieFile(path.clone()),
            None => Auth::CookieFile(self.data_dir().join(".cookie")),
        }
    }
}

impl Default for BTCConfig {
    fn default() -> Self {
        BTCConfig {
            network: default_network(),
            data_dir: None,
            rpc_url: None,
            auth: None,
        }
    }
}
