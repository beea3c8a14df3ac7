use bitcoincore_rpc::bitcoin::Txid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The transactions of a batch could not be put in dependency order
    #[error("malformed transaction batch: {0}")]
    MalformedBatch(String),

    /// A header or block the chain walk relies on is missing
    #[error("chain store is not continuous: {0}")]
    StoreInconsistency(String),

    #[error("chain store access failed: {0}")]
    Store(String),

    #[error("failed to submit transaction {txid}")]
    SubmissionFailure { txid: Txid },
}

pub type HistoryResult<T> = Result<T, HistoryError>;
