use chrono::{DateTime, Utc};
use serde::Serialize;

/// Meta name addressing every registered service
pub const ALL_SERVICES: &str = "*all";

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    Registered,
    Starting,
    Running,
    Reloading,
    Stopping,
    Stopped,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
}

/// What a reload request did to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadAction {
    Reloaded,
    Started,
    Stopped,
    Unchanged,
}

/// Snapshot of one managed service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ComponentState,
    pub running: bool,
    pub should_run: bool,
    pub since: DateTime<Utc>,
}

/// Outcome of [`ServiceManager::start_services`](super::ServiceManager::start_services)
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl StartupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`ServiceManager::shutdown_services`](super::ServiceManager::shutdown_services)
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub abandoned: Vec<String>,
}

impl ShutdownReport {
    /// Exit code for the process supervisor
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() && self.abandoned.is_empty() {
            0
        } else {
            1
        }
    }
}
