//! Binary entry point: `chain-node <config.json> [console_log]`
//! (spec.md §6 "External interfaces — process invocation").

use chain_node::config::{Cli, NodeConfig};
use chain_node::pipeline::Pipeline;
use chain_node::rpc::{run_server, AppState};
use clap::Parser;
use log::{error, info};
use std::sync::atomic::Ordering;

fn init_logging(console_log: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(log::LevelFilter::Info);
    if !console_log {
        // Teacher's daemon defaults file-only logging; leaving env_logger's
        // stderr target in place but quieted is good enough here since
        // this node has no separate file appender dependency.
        builder.filter_level(log::LevelFilter::Warn);
    }
    let _ = builder.try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.console_log);

    let config = NodeConfig::load(&cli.config_path)?;
    info!("loaded config from {}", cli.config_path.display());

    let (mut pipeline, handles, cache, last_100) = Pipeline::start(&config, &config.path_to_bd)?;
    let stop = pipeline.stop_flag();

    let rpc_state = AppState { store: pipeline.store_handle(), cache, last_100 };
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let server = tokio::spawn(async move { run_server(&bind_addr, rpc_state).await });

    let shutdown_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_stop.store(true, Ordering::SeqCst);
        }
    });

    pipeline.run(stop).await?;

    for handle in [handles.indexer, handles.cache, handles.node_test] {
        if let Err(e) = handle.join().expect("worker thread panicked") {
            error!("worker exited with error: {e}");
        }
    }

    server.abort();
    Ok(())
}
