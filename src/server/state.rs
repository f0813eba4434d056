//! Shared application state for the HTTP API

use std::sync::Arc;

use crate::config::Config;
use crate::engine::AgentOrchestrator;
use crate::provider::ProviderClient;
use crate::relay::RelayHandle;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<Store>,
    pub relay: RelayHandle,
    pub provider: Arc<ProviderClient>,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub config: Arc<Config>,
}
