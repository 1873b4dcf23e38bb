//! # Ruta Server
//!
//! JSON over HTTP for the dispatch core, plus Server-Sent Events for the
//! available-trip feed and per-trip updates.

pub mod api;
pub mod config;

use std::sync::Arc;

use ruta_common::Result;
use ruta_dispatch::{Dispatcher, InMemoryKycRegistry};

pub use api::{router, ApiError, AppState};
pub use config::ServerConfig;

/// Server version
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire the dispatcher over in-memory stores
pub fn build_state(config: &ServerConfig) -> Result<AppState> {
    let kyc = Arc::new(InMemoryKycRegistry::new());
    let dispatcher = Dispatcher::in_memory(kyc.clone(), config.dispatch.clone())?;
    Ok(AppState { dispatcher, kyc })
}
