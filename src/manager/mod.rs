mod orchestrator;
mod reload;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::ServiceManager;
pub use types::{
    ComponentState, ReloadAction, ServiceStatus, ShutdownReason, ShutdownReport, StartupReport,
    ALL_SERVICES,
};
