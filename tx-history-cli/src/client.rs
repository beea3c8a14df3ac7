use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tx_history::{GetTxHistoryParams, HistoryCheckpointParam, SaveTxParams, TxHistoryResult};
use bitcoincore_rpc::bitcoin::Txid;
use txh_util::AddressHash;

pub struct RpcClient {
    url: String,
    client: Client,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, String> {
        let client = Client::builder().build().map_err(|e| {
            let msg = format!("Failed to build HTTP client: {}", e);
            log::error!("{}", msg);
            msg
        })?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub async fn get_network_type(&self) -> Result<String, String> {
        self.rpc_call::<String>("get_network_type", json!([])).await
    }

    pub async fn get_tx_history(
        &self,
        address: AddressHash,
        checkpoint: Option<HistoryCheckpointParam>,
    ) -> Result<TxHistoryResult, String> {
        let params = GetTxHistoryParams {
            address,
            checkpoint,
        };

        self.rpc_call::<TxHistoryResult>("get_tx_history", json!([params]))
            .await
    }

    pub async fn save_tx(&self, txid: Txid, tx_hex: String) -> Result<(), String> {
        let params = SaveTxParams { txid, tx: tx_hex };

        self.rpc_call::<()>("save_tx", json!([params])).await
    }

    pub async fn stop(&self) -> Result<(), String> {
        self.rpc_call::<()>("stop", json!([])).await
    }

    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, String> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: Value = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let msg = format!("Failed to send RPC request: {}", e);
                log::error!("{}", msg);
                msg
            })?
            .json()
            .await
            .map_err(|e| {
                let msg = format!("Failed to parse RPC response: {}", e);
                log::error!("{}", msg);
                msg
            })?;

        if let Some(err) = resp.get("error") {
            let msg = format!("RPC Error: {}", err);
            log::error!("{}", msg);
            return Err(msg);
        }

        serde_json::from_value(resp["result"].clone()).map_err(|e| {
            let msg = format!("Failed to parse RPC result: {}", e);
            log::error!("{}", msg);
            msg
        })
    }
}
