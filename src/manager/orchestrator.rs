use super::types::ComponentState;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::registry::ServiceRegistry;
use crate::reload::ReloadRouter;
use crate::service::{Dependency, Service};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Cancellation scope of one `start_services` run
#[derive(Clone)]
pub(super) struct Activation {
    pub(super) token: CancellationToken,
    pub(super) id: Uuid,
}

impl Activation {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            id: Uuid::new_v4(),
        }
    }
}

/// Drives startup, reload and shutdown of every registered service.
///
/// Clones share the same registry, state table and activation.
#[derive(Clone)]
pub struct ServiceManager {
    pub(super) config: Arc<ConfigStore>,
    pub(super) registry: Arc<ServiceRegistry>,
    pub(super) router: Arc<ReloadRouter>,

    // Lifecycle management
    pub(super) component_states: Arc<RwLock<HashMap<String, (ComponentState, DateTime<Utc>)>>>,
    pub(super) service_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    /// Dependency set each service declared when it last started
    pub(super) started_with: Arc<RwLock<HashMap<String, Vec<Dependency>>>>,
    pub(super) activation: Arc<RwLock<Activation>>,
    pub(super) dispatcher_token: CancellationToken,
}

impl ServiceManager {
    /// Create a manager with the default reload routes
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self::with_router(config, ReloadRouter::with_default_routes())
    }

    /// Create a manager with a custom section to service table
    pub fn with_router(config: Arc<ConfigStore>, router: ReloadRouter) -> Self {
        Self {
            config,
            registry: Arc::new(ServiceRegistry::new()),
            router: Arc::new(router),
            component_states: Arc::new(RwLock::new(HashMap::new())),
            service_locks: Arc::new(Mutex::new(HashMap::new())),
            started_with: Arc::new(RwLock::new(HashMap::new())),
            activation: Arc::new(RwLock::new(Activation::new())),
            dispatcher_token: CancellationToken::new(),
        }
    }

    /// Register services. Registration order has no effect on start order.
    pub fn add_services<I>(&self, services: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Service>>,
    {
        for service in services {
            let name = service.service_name().to_string();
            self.registry.add(service)?;
            self.set_component_state(&name, ComponentState::Registered);
            info!("Service {} registered", name);
        }
        Ok(())
    }

    /// Registry handed to services at construction time
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.config)
    }

    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.registry.lookup(name)
    }

    /// Token shared by every start of the current activation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.activation.read().token.clone()
    }

    pub fn activation_id(&self) -> Uuid {
        self.activation.read().id
    }

    /// Stop [`run_reload_loop`](Self::run_reload_loop) without closing its channel
    pub fn stop_reload_loop(&self) {
        self.dispatcher_token.cancel();
    }

    /// Current activation, replaced by a fresh one if it was cancelled
    pub(super) fn activate(&self) -> Activation {
        let mut activation = self.activation.write();
        if activation.token.is_cancelled() {
            *activation = Activation::new();
            info!("New activation {}", activation.id);
        }
        activation.clone()
    }

    /// Cancel every in-flight start of the current activation
    pub(super) fn cancel_activation(&self) {
        self.activation.read().token.cancel();
    }

    /// Lock serializing lifecycle calls on one service
    pub(super) fn service_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.service_locks.lock();
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}
