use super::rpc::*;
use crate::config::TxHistoryConfigRef;
use crate::error::HistoryError;
use crate::history::TxHistoryRef;
use crate::types::HistoryCheckpoint;
use jsonrpc_core::IoHandler;
use jsonrpc_core::{Error as JsonError, ErrorCode, Result as JsonResult};
use jsonrpc_http_server::{AccessControlAllowOrigin, DomainsValidation, ServerBuilder};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

// Server error codes, within the -32000..-32099 range reserved by JSON-RPC
pub const ERROR_CODE_MALFORMED_BATCH: i64 = -32001;
pub const ERROR_CODE_STORE_INCONSISTENCY: i64 = -32002;
pub const ERROR_CODE_STORE: i64 = -32003;
pub const ERROR_CODE_SUBMISSION_FAILURE: i64 = -32010;

fn history_error(e: HistoryError) -> JsonError {
    let (code, data) = match &e {
        HistoryError::MalformedBatch(_) => (ERROR_CODE_MALFORMED_BATCH, None),
        HistoryError::StoreInconsistency(_) => (ERROR_CODE_STORE_INCONSISTENCY, None),
        HistoryError::Store(_) => (ERROR_CODE_STORE, None),
        HistoryError::SubmissionFailure { txid } => (
            ERROR_CODE_SUBMISSION_FAILURE,
            Some(serde_json::Value::String(txid.to_string())),
        ),
    };

    JsonError {
        code: ErrorCode::ServerError(code),
        message: e.to_string(),
        data,
    }
}

fn invalid_params(msg: String) -> JsonError {
    warn!("Invalid RPC params: {}", msg);
    JsonError {
        code: ErrorCode::InvalidParams,
        message: msg,
        data: None,
    }
}

#[derive(Clone)]
pub struct TxHistoryRpcServer {
    config: TxHistoryConfigRef,
    history: TxHistoryRef,
    shutdown_tx: watch::Sender<()>,
    server_handle: Arc<Mutex<Option<jsonrpc_http_server::CloseHandle>>>,
}

impl TxHistoryRpcServer {
    pub fn new(
        config: TxHistoryConfigRef,
        history: TxHistoryRef,
        shutdown_tx: watch::Sender<()>,
    ) -> Self {
        Self {
            config,
            history,
            shutdown_tx,
            server_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn start(
        config: TxHistoryConfigRef,
        history: TxHistoryRef,
        shutdown_tx: watch::Sender<()>,
    ) -> Result<Self, String> {
        let ret = Self::new(config.clone(), history, shutdown_tx);

        let mut io = IoHandler::new();
        io.extend_with(ret.clone().to_delegate());

        let addr = format!("127.0.0.1:{}", config.rpc_server.port)
            .parse()
            .map_err(|e| {
                let msg = format!("Failed to parse RPC server address: {}", e);
                error!("{}", msg);
                msg
            })?;

        let server = ServerBuilder::new(io)
            .cors(DomainsValidation::AllowOnly(vec![
                AccessControlAllowOrigin::Any,
            ]))
            .start_http(&addr)
            .map_err(|e| {
                let msg = format!("Unable to start RPC server: {}", e);
                error!("{}", msg);
                msg
            })?;

        let handle = server.close_handle();
        info!("RPC server listening on {}", addr);
        tokio::task::spawn_blocking(move || {
            server.wait();
        });

        {
            let mut current = ret.server_handle.lock().unwrap();
            if current.is_some() {
                let msg = "RPC server is already running".to_string();
                error!("{}", msg);
                return Err(msg);
            }
            *current = Some(handle);
        }

        Ok(ret)
    }

    pub fn get_listen_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.config.rpc_server.port)
    }

    pub async fn close(&self) {
        let handle = self.server_handle.lock().unwrap().take();
        match handle {
            Some(handle) => {
                info!("Closing RPC server.");
                if let Err(e) = tokio::task::spawn_blocking(move || handle.close()).await {
                    error!("Failed to close RPC server: {}", e);
                }

                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                info!("RPC server closed.");
            }
            None => {
                warn!("RPC server handle not found.");
            }
        }
    }
}

impl TxHistoryRpc for TxHistoryRpcServer {
    fn get_network_type(&self) -> JsonResult<String> {
        let network = self.config.btc.network();

        Ok(network.to_string())
    }

    fn get_tx_history(&self, params: GetTxHistoryParams) -> JsonResult<TxHistoryResult> {
        let checkpoint = match &params.checkpoint {
            Some(param) => Some(HistoryCheckpoint::try_from(param).map_err(invalid_params)?),
            None => None,
        };

        let answer = self
            .history
            .get_tx_history(&params.address, checkpoint)
            .map_err(history_error)?;

        Ok(TxHistoryResult::from(&answer))
    }

    fn save_tx(&self, params: SaveTxParams) -> JsonResult<()> {
        let tx = decode_tx(&params.tx).map_err(invalid_params)?;
        self.history
            .save_tx(&params.txid, &tx)
            .map_err(history_error)
    }

    fn stop(&self) -> JsonResult<()> {
        info!("Received stop command via RPC.");
        if let Err(e) = self.shutdown_tx.send(()) {
            let msg = format!("Failed to send shutdown signal: {}", e);
            error!("{}", msg);
            return Err(JsonError {
                code: ErrorCode::InternalError,
                message: msg,
                data: None,
            });
        }

        if let Some(handle) = self.server_handle.lock().unwrap().take() {
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                info!("Closing RPC server.");
                handle.close();
            });
        }

        Ok(())
    }
}
