//! HTTP surface of the ObsVault Observation service.

pub mod api;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

use obsvault_storage::ObservationStore;
use std::sync::Arc;

pub use config::{load_config, AppConfig};
pub use server::{build_app, ObsVaultServer, ServerBuilder};

/// Shared handler state: the storage backend and the externally visible
/// base URL for Location headers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObservationStore>,
    pub base_url: String,
}
