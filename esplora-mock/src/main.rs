/// Esplora Mock Server
/// 
/// A lightweight Esplora-compatible server backed by an in-memory ledger.
/// Designed for local development against the transfer engine.

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;

use esplora_mock::{run_server, BroadcastBehavior, MockLedger};

#[derive(Debug)]
struct Config {
    // Ledger
    tip_height: u64,
    broadcast_behavior: BroadcastBehavior,

    // Server
    server_host: String,
    server_port: u16,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present
        
        let tip_height = env::var("MOCK_TIP_HEIGHT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("Invalid MOCK_TIP_HEIGHT")?;

        // "accept" (default) or "reject:<reason>"
        let broadcast_behavior = match env::var("MOCK_BROADCAST") {
            Ok(value) => match value.split_once(':') {
                Some(("reject", reason)) => BroadcastBehavior::Reject {
                    status: 400,
                    reason: reason.to_string(),
                },
                _ => BroadcastBehavior::Accept,
            },
            Err(_) => BroadcastBehavior::Accept,
        };
        
        let server_host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());
        
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("Invalid SERVER_PORT")?;
        
        Ok(Self {
            tip_height,
            broadcast_behavior,
            server_host,
            server_port,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();
    
    log::info!("Starting Esplora Mock Server...");
    
    // Load configuration
    let config = Config::from_env()
        .context("Failed to load configuration")?;
    
    log::info!("Tip height: {}, broadcast: {:?}", config.tip_height, config.broadcast_behavior);
    log::info!("Server will listen on {}:{}", config.server_host, config.server_port);
    
    let ledger = Arc::new(MockLedger::new());
    ledger.set_tip_height(config.tip_height);
    ledger.set_broadcast_behavior(config.broadcast_behavior);
    
    // Run server
    run_server(ledger, config.server_host, config.server_port)
        .await
        .context("Server error")?;
    
    Ok(())
}
