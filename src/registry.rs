//! Concurrent name to service lookup.

use crate::error::{Result, ServiceError};
use crate::service::{Service, ServiceKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Registry of live service instances.
///
/// Lookups never block. Waiting for a name to appear is left to
/// [`DependencyWaiter`](crate::DependencyWaiter), which uses
/// [`wait_registered`](Self::wait_registered).
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    registrations: watch::Sender<u64>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        let (registrations, _) = watch::channel(0);
        Self {
            services: RwLock::new(HashMap::new()),
            registrations,
        }
    }

    /// Register `service` under its own name
    pub fn add(&self, service: Arc<dyn Service>) -> Result<()> {
        let name = service.service_name().to_string();
        {
            let mut services = self.services.write();
            if services.contains_key(&name) {
                return Err(ServiceError::AlreadyRegistered { service: name });
            }
            services.insert(name.clone(), service);
        }

        self.registrations.send_modify(|generation| *generation += 1);
        debug!("Registered service {}", name);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.read().get(name).cloned()
    }

    /// Typed lookup through a [`ServiceKey`]
    pub fn get<S: Service>(&self, key: &ServiceKey<S>) -> Result<Arc<S>> {
        let service = self.lookup(key.name()).ok_or_else(|| ServiceError::NotFound {
            service: key.name().to_string(),
        })?;
        downcast(service)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Service>> {
        let removed = self.services.write().remove(name);
        if removed.is_some() {
            debug!("Removed service {}", name);
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered service
    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        self.services.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Resolve `name`, waiting for it to be registered if needed.
    ///
    /// Unbounded; callers put their own timeout around it.
    pub async fn wait_registered(&self, name: &str) -> Arc<dyn Service> {
        let mut changes = self.registrations.subscribe();
        loop {
            if let Some(service) = self.lookup(name) {
                return service;
            }
            if changes.changed().await.is_err() {
                // The sender lives as long as `self`
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrow a registry entry to its concrete type
pub(crate) fn downcast<S: Service>(service: Arc<dyn Service>) -> Result<Arc<S>> {
    let name = service.service_name().to_string();
    service
        .into_any()
        .downcast::<S>()
        .map_err(|_| ServiceError::TypeMismatch { service: name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock::MockService;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_add_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.add(MockService::new("Cache").into_service()).unwrap();

        assert!(registry.contains("Cache"));
        assert_eq!(registry.lookup("Cache").unwrap().service_name(), "Cache");
        assert!(registry.lookup("Filter").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ServiceRegistry::new();
        registry.add(MockService::new("Cache").into_service()).unwrap();

        let result = registry.add(MockService::new("Cache").into_service());
        assert!(matches!(result, Err(ServiceError::AlreadyRegistered { .. })));
    }

    #[test]
    fn test_typed_lookup() {
        const MOCK_CACHE: ServiceKey<MockService> = ServiceKey::new("Cache");
        const WRONG_TYPE: ServiceKey<crate::services::FilterService> = ServiceKey::new("Cache");

        let registry = ServiceRegistry::new();
        registry.add(MockService::new("Cache").into_service()).unwrap();

        let cache = registry.get(&MOCK_CACHE).unwrap();
        assert_eq!(cache.service_name(), "Cache");
        assert!(matches!(
            registry.get(&WRONG_TYPE),
            Err(ServiceError::TypeMismatch { .. })
        ));
        assert!(matches!(
            registry.get(&crate::services::CHARGER),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let registry = ServiceRegistry::new();
        registry.add(MockService::new("Cache").into_service()).unwrap();

        assert!(registry.remove("Cache").is_some());
        assert!(registry.remove("Cache").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wait_registered_sees_late_registration() {
        let registry = Arc::new(ServiceRegistry::new());

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_registered("Filter").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.add(MockService::new("Cache").into_service()).unwrap();
        registry.add(MockService::new("Filter").into_service()).unwrap();

        let service = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("registration should wake the waiter")
            .unwrap();
        assert_eq!(service.service_name(), "Filter");
    }
}
