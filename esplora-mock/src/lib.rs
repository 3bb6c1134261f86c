/// Esplora Mock Server Library
/// 
/// This crate provides both a standalone binary and library components
/// for mocking the Esplora API with a programmable in-memory ledger.

pub mod handlers;
pub mod ledger;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use ledger::{BroadcastBehavior, Endpoint, MockLedger};
pub use server::{create_router, run_server, spawn};
pub use types::*;
