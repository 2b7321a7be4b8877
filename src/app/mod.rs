//! Application layer: business logic and background tasks.

pub mod monitor;
pub mod service;
pub mod state;
pub mod worker;

pub use monitor::{ConfirmationMonitor, MonitorConfig, spawn_monitor};
pub use service::{JobService, JobServiceConfig};
pub use state::AppState;
pub use worker::{WorkerConfig, spawn_worker};
