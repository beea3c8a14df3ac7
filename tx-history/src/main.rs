mod tool;

#[macro_use]
extern crate log;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tx_history::{BTCRpcStore, TxHistory, TxHistoryConfig, TxHistoryRpcServer, TxHistoryService};
use txh_util::LogConfig;

#[derive(Parser, Debug)]
#[command(name = "tx-history")]
#[command(author = "buckyos")]
#[command(version = "0.1.0")]
#[command(about = "Bitcoin Address Transaction History Service", long_about = None)]
struct TxHistoryCli {
    #[command(subcommand)]
    command: Option<TxHistoryCommands>,

    /// Run the service in daemon mode
    #[arg(short, long)]
    daemon: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
#[command(rename_all = "kebab-case")]
enum TxHistoryCommands {
    /// Print the effective configuration and exit
    ShowConfig {},
}

fn load_config(root_dir: &std::path::Path) -> TxHistoryConfig {
    match TxHistoryConfig::load(root_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config: {}", e);
            println!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

async fn wait_sigterm() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to create SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    // On non-Unix systems, we only rely on Ctrl+C
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

async fn main_run() {
    let (_lock, _guard) = txh_util::init_process_lock(txh_util::TX_HISTORY_SERVICE_NAME);

    let log_config = LogConfig::new(txh_util::TX_HISTORY_SERVICE_NAME).enable_console(false);
    txh_util::init_log(log_config);

    let root_dir = txh_util::get_service_dir(txh_util::TX_HISTORY_SERVICE_NAME);
    info!("Using service directory: {}", root_dir.display());
    println!("Using service directory: {}", root_dir.display());

    let config = Arc::new(load_config(&root_dir));

    let store = BTCRpcStore::new(
        config.btc.rpc_url(),
        config.btc.auth(),
        config.history.block_cache_size,
    );
    let (chain_store, mempool, submitter) = store.into_refs();

    let service = TxHistoryService::new(config.history.clone(), chain_store, mempool, submitter);
    let history = Arc::new(Box::new(service) as Box<dyn TxHistory>);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());

    let rpc_server = match TxHistoryRpcServer::start(config.clone(), history, shutdown_tx) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start RPC server: {}", e);
            println!("Failed to start RPC server: {}", e);
            std::process::exit(1);
        }
    };
    println!("RPC server started at {}", rpc_server.get_listen_url());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            println!("Shutting down...");
        }
        _ = wait_sigterm() => {
            info!("Received SIGTERM, shutting down...");
            println!("Shutting down...");
        }
        _ = shutdown_rx.changed() => {
            info!("Shutdown signal received from RPC, shutting down...");
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    rpc_server.close().await;
    println!("Shutdown complete.");

    // Give the file logger a moment to flush
    tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
}

#[tokio::main]
async fn main() {
    let cli = TxHistoryCli::parse();

    match cli.command {
        Some(TxHistoryCommands::ShowConfig {}) => {
            let log_config =
                LogConfig::new(txh_util::TX_HISTORY_SERVICE_NAME).enable_file(false);
            txh_util::init_log(log_config);

            let root_dir = txh_util::get_service_dir(txh_util::TX_HISTORY_SERVICE_NAME);
            let config = load_config(&root_dir);
            match toml::to_string_pretty(&config) {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    println!("Failed to serialize config: {}", e);
                    std::process::exit(1);
                }
            }
            return;
        }
        None => {}
    }

    if cli.daemon {
        crate::tool::daemonize_process(txh_util::TX_HISTORY_SERVICE_NAME);
    }

    main_run().await;
    println!("Tx History service exited.");
}
