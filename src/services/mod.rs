//! Thin adapters wiring subsystems into the service lifecycle.

mod cache;
mod charger;
mod datastore;
mod filter;


pub use cache::{partition_state, CacheHandle, CacheService};
pub use charger::{ChargerHandle, ChargerService};
pub use datastore::{DataStoreConn, DataStoreService};
pub use filter::{FilterIndex, FilterService};

use crate::config::ConfigStore;
use crate::listener::ApiListener;
use crate::registry::ServiceRegistry;
use crate::service::{Service, ServiceKey};
use crate::waiter::DependencyWaiter;
use std::sync::Arc;

pub const DATA_STORE: ServiceKey<DataStoreService> = ServiceKey::new("DataStore");
pub const CACHE: ServiceKey<CacheService> = ServiceKey::new("Cache");
pub const FILTER: ServiceKey<FilterService> = ServiceKey::new("Filter");
pub const CHARGER: ServiceKey<ChargerService> = ServiceKey::new("Charger");

/// Collaborators handed to every service at construction
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<ConfigStore>,
    pub registry: Arc<ServiceRegistry>,
    pub listener: Arc<ApiListener>,
}

impl ServiceContext {
    pub fn new(
        config: Arc<ConfigStore>,
        registry: Arc<ServiceRegistry>,
        listener: Arc<ApiListener>,
    ) -> Self {
        Self {
            config,
            registry,
            listener,
        }
    }

    /// Waiter bounded by the live connect timeout
    pub fn waiter(&self) -> DependencyWaiter {
        let timeout = self.config.current().general.connect_timeout();
        DependencyWaiter::new(Arc::clone(&self.registry), timeout)
    }
}

/// Construct every reference service
pub fn build_services(ctx: &ServiceContext) -> Vec<Arc<dyn Service>> {
    vec![
        Arc::new(DataStoreService::new(ctx.clone())),
        Arc::new(CacheService::new(ctx.clone())),
        Arc::new(FilterService::new(ctx.clone())),
        Arc::new(ChargerService::new(ctx.clone())),
    ]
}
