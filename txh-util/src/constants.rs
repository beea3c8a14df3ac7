// Service names
pub const TX_HISTORY_SERVICE_NAME: &str = "tx-history";
pub const TX_HISTORY_CLI_TOOL_NAME: &str = "tx-history-cli";

// Directory constants
pub const TXH_ROOT_DIR: &str = ".txh";

// Service http ports
pub const TX_HISTORY_SERVICE_HTTP_PORT: u16 = 8199;

// Number of most recent blocks that may still be reorganized away and so are
// never cached in a history checkpoint
pub const DEFAULT_SECURITY_DEPTH: usize = 6;
