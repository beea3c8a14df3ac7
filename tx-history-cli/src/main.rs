mod client;
mod cmd;
mod history_service;

use clap::Parser;
use cmd::Cli;
use history_service::TxHistoryClientService;

#[tokio::main]
async fn main() {
    let log_config = txh_util::LogConfig::new(txh_util::TX_HISTORY_CLI_TOOL_NAME)
        .enable_file(false)
        .enable_console(true)
        .with_level("warn");

    txh_util::init_log(log_config);

    let cli = Cli::parse();
    let service = match TxHistoryClientService::new(&cli.url).await {
        Ok(service) => service,
        Err(e) => {
            println!("Failed to connect to Tx History Service: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = service.process_command(cli).await {
        println!("Error processing command: {}", e);
        std::process::exit(1);
    }
}
