//! Bundler core demo entrypoint.
//!
//! Wires configuration, chain RPC, and the three managers together and runs
//! the gas-price manager's refresh loop until SIGINT/SIGTERM. This binary
//! owns no JSON-RPC surface of its own — that's the job of the external
//! driver this crate is a library for.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the config file path (default `config.json`)

use std::sync::Arc;

use dotenvy::dotenv;

use bundler_core::chain::rpc::AlloyEvmRpc;
use bundler_core::chain::PolygonGasStation;
use bundler_core::config::Config;
use bundler_core::gas::{GasPriceManager, GasPriceManagerConfig};
use bundler_core::mempool::Mempool;
use bundler_core::sender::{RedisWalletBackend, SenderManager, SharedWalletBackend};
use bundler_core::util::SigDown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;

    let rpc = Arc::new(AlloyEvmRpc::connect_http(config.rpc_http.clone()));
    let gas_station = config.gas_station_http.clone().map(PolygonGasStation::new);
    let gas_price_manager = Arc::new(GasPriceManager::new(
        rpc.clone(),
        gas_station,
        GasPriceManagerConfig {
            gas_price_bump: config.gas_price_bump,
            gas_price_expiry: config.gas_price_expiry,
            gas_price_refresh_interval: config.gas_price_refresh_interval(),
            legacy_transactions: config.legacy_transactions,
            chain_type: config.chain_type,
        },
    ));

    let mut executor_wallets = config
        .executor_private_keys
        .iter()
        .map(|key| alloy_signer_local::PrivateKeySigner::from_bytes(&key.0 .0))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|signer| alloy_signer::Signer::address(&signer))
        .collect::<Vec<alloy_primitives::Address>>();
    executor_wallets.truncate(config.max_executors);

    let sender_manager = match &config.redis_queue_endpoint {
        Some(endpoint) => {
            let backend: Arc<dyn SharedWalletBackend> =
                Arc::new(RedisWalletBackend::connect(endpoint.as_str()).await?);
            let manager = SenderManager::new_shared(executor_wallets, backend);
            manager.seed_shared_queue().await?;
            Arc::new(manager)
        }
        None => Arc::new(SenderManager::new_local(executor_wallets)),
    };

    let _mempool = Mempool::new();

    tracing::info!(
        chain_id = config.chain_id,
        executors = sender_manager.get_all_wallets().len(),
        "bundler core started"
    );

    let sig_down = SigDown::try_new()?;
    gas_price_manager.run_refresh_loop(sig_down.cancellation_token()).await;

    Ok(())
}
