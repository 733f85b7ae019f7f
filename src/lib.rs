pub mod broadcast;
pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod registry;
pub mod reload;
pub mod service;
pub mod services;
pub mod waiter;

pub use broadcast::{StateBroadcast, StateSignal, STATE_DOWN, STATE_UP};
pub use config::{ChargeflowConfig, ConfigStore};
pub use error::{Result, ServiceError};
pub use listener::ApiListener;
pub use manager::{
    ComponentState, ReloadAction, ServiceManager, ServiceStatus, ShutdownReason, ShutdownReport,
    StartupReport, ALL_SERVICES,
};
pub use registry::ServiceRegistry;
pub use reload::{ReloadEvent, ReloadRouter};
pub use service::{Dependency, Service, ServiceBase, ServiceKey};
pub use services::{build_services, ServiceContext};
pub use waiter::{wait_for_dependencies, wait_for_services, DependencyWaiter, ResolvedDependencies};
