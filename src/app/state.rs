//! Application state management.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ChainClient, ChainSettings, JobStore};

use super::monitor::{ConfirmationMonitor, MonitorConfig};
use super::service::{JobService, JobServiceConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
    pub monitor: Arc<ConfirmationMonitor>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        chain_client: Arc<dyn ChainClient>,
        settings: HashMap<String, ChainSettings>,
        service_config: JobServiceConfig,
        monitor_config: MonitorConfig,
    ) -> Self {
        let service = Arc::new(JobService::new(
            Arc::clone(&store),
            Arc::clone(&chain_client),
            settings.clone(),
            service_config,
        ));
        let monitor = Arc::new(ConfirmationMonitor::new(
            store,
            chain_client,
            settings,
            monitor_config,
        ));
        Self { service, monitor }
    }
}
