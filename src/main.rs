//! Application entry point.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nft_mint_relayer::api::create_router;
use nft_mint_relayer::app::{
    AppState, JobServiceConfig, MonitorConfig, WorkerConfig, spawn_monitor, spawn_worker,
};
use nft_mint_relayer::domain::{ChainClient, ChainSettings};
use nft_mint_relayer::infra::chain::{DemoChainClient, EvmChainClient, EvmChainConfig};
use nft_mint_relayer::infra::database::{PostgresConfig, PostgresJobStore};
use nft_mint_relayer::infra::rpc::{ResilientRpcProvider, RpcEndpoint, default_endpoints};

/// Application configuration
struct Config {
    database_url: String,
    /// Absent in demo deployments; the demo chain client is used instead
    minter_private_key: Option<SecretString>,
    nft_contract: Option<String>,
    token_contract: Option<String>,
    default_chain: String,
    token_uri_host: String,
    host: String,
    port: u16,
    enable_background_worker: bool,
    worker_poll_secs: u64,
    enable_confirmation_monitor: bool,
    monitor_poll_secs: u64,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;

        let minter_private_key = env::var("MINTER_PRIVATE_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        let nft_contract = env::var("NFT_CONTRACT_ADDRESS")
            .ok()
            .filter(|a| !a.is_empty());
        let token_contract = env::var("TOKEN_CONTRACT_ADDRESS")
            .ok()
            .filter(|a| !a.is_empty());

        let default_chain =
            env::var("DEFAULT_CHAIN").unwrap_or_else(|_| "base-sepolia".to_string());
        let token_uri_host =
            env::var("TOKEN_URI_HOST").unwrap_or_else(|_| "localhost".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let enable_background_worker = env::var("ENABLE_BACKGROUND_WORKER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);
        let worker_poll_secs = env::var("WORKER_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let enable_confirmation_monitor = env::var("ENABLE_CONFIRMATION_MONITOR")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);
        let monitor_poll_secs = env::var("MONITOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            database_url,
            minter_private_key,
            nft_contract,
            token_contract,
            default_chain,
            token_uri_host,
            host,
            port,
            enable_background_worker,
            worker_poll_secs,
            enable_confirmation_monitor,
            monitor_poll_secs,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// RPC endpoints for one chain: `RPC_URLS_<CHAIN>` (comma-separated,
/// priority in listed order) when set, built-in public endpoints otherwise.
fn endpoints_for(chain: &str) -> Option<Vec<RpcEndpoint>> {
    let var = format!("RPC_URLS_{}", chain.to_uppercase().replace('-', "_"));
    if let Ok(urls) = env::var(&var) {
        let endpoints: Vec<RpcEndpoint> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .enumerate()
            .map(|(i, url)| RpcEndpoint::new(url, i as u32 + 1, format!("{} #{}", chain, i + 1)))
            .collect();
        if !endpoints.is_empty() {
            return Some(endpoints);
        }
    }
    default_endpoints(chain)
}

fn build_chain_client(
    config: &Config,
    settings: &HashMap<String, ChainSettings>,
) -> Result<Arc<dyn ChainClient>> {
    let Some(private_key) = config.minter_private_key.clone() else {
        warn!("MINTER_PRIVATE_KEY not set - running with the demo chain client");
        return Ok(Arc::new(DemoChainClient::new()));
    };

    let mut providers = HashMap::new();
    for (chain, chain_settings) in settings {
        let Some(endpoints) = endpoints_for(chain) else {
            warn!(chain = %chain, "No RPC endpoints known for chain, skipping");
            continue;
        };
        let provider = ResilientRpcProvider::new(chain, chain_settings.chain_id, endpoints)?;
        providers.insert(chain.clone(), Arc::new(provider));
    }

    let evm_config = EvmChainConfig {
        private_key,
        nft_contract: config.nft_contract.clone().unwrap_or_default(),
        token_contract: config.token_contract.clone(),
        default_chain: config.default_chain.clone(),
        ..EvmChainConfig::default()
    };

    let client = EvmChainClient::new(evm_config, providers, settings.clone())?;
    Ok(Arc::new(client))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🏗️  NFT Mint Relayer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let settings = ChainSettings::defaults();

    info!("📦 Initializing infrastructure...");

    // Initialize database
    let db_config = PostgresConfig::default();
    let store = PostgresJobStore::new(&config.database_url, db_config).await?;
    store.run_migrations().await?;
    info!("   ✓ Database connected and migrations applied");

    // Initialize chain client (real EVM signer or demo fallback)
    let chain_client = build_chain_client(&config, &settings)?;
    info!("   ✓ Chain client created (default chain: {})", config.default_chain);

    let service_config = JobServiceConfig {
        default_chain: config.default_chain.clone(),
        token_uri_host: config.token_uri_host.clone(),
    };
    let monitor_config = MonitorConfig {
        poll_interval: std::time::Duration::from_secs(config.monitor_poll_secs),
        enabled: config.enable_confirmation_monitor,
        ..MonitorConfig::default()
    };

    let app_state = Arc::new(AppState::new(
        Arc::new(store),
        chain_client,
        settings,
        service_config,
        monitor_config.clone(),
    ));

    // Start background worker if enabled
    let worker_shutdown_tx = if config.enable_background_worker {
        let worker_config = WorkerConfig {
            poll_interval: std::time::Duration::from_secs(config.worker_poll_secs),
            enabled: true,
        };
        let (_worker_handle, shutdown_tx) =
            spawn_worker(Arc::clone(&app_state.service), worker_config);
        info!("   ✓ Background worker started");
        Some(shutdown_tx)
    } else {
        info!("   ○ Background worker disabled");
        None
    };

    // Start confirmation monitor if enabled
    let monitor_shutdown_tx = if monitor_config.enabled {
        let (_monitor_handle, shutdown_tx) = spawn_monitor(Arc::clone(&app_state.monitor));
        info!(
            "   ✓ Confirmation monitor started (poll: {}s)",
            config.monitor_poll_secs
        );
        Some(shutdown_tx)
    } else {
        info!("   ○ Confirmation monitor disabled");
        None
    };

    let router = create_router(Arc::clone(&app_state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal background tasks to shutdown
    if let Some(tx) = worker_shutdown_tx {
        let _ = tx.send(true);
    }
    if let Some(tx) = monitor_shutdown_tx {
        let _ = tx.send(true);
    }

    info!("Server shutdown complete");
    Ok(())
}
