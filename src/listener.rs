//! Shared registration point for externally callable service APIs.
//!
//! Transport is out of scope here: the listener only tracks which API
//! surfaces are currently exposed and by whom.

use crate::error::{Result, ServiceError};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ApiListener {
    apis: RwLock<HashMap<String, String>>,
}

impl ApiListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `api` on behalf of `owner`
    pub fn register(&self, api: &str, owner: &str) -> Result<()> {
        let mut apis = self.apis.write();
        if let Some(current) = apis.get(api) {
            if current != owner {
                return Err(ServiceError::component(
                    owner,
                    format!("API {} is already exposed by {}", api, current),
                ));
            }
            return Ok(());
        }

        apis.insert(api.to_string(), owner.to_string());
        debug!("API {} registered by {}", api, owner);
        Ok(())
    }

    /// Withdraw `api`. Returns whether it was exposed.
    pub fn unregister(&self, api: &str) -> bool {
        let removed = self.apis.write().remove(api);
        match removed {
            Some(owner) => {
                debug!("API {} unregistered by {}", api, owner);
                true
            }
            None => {
                warn!("API {} was not registered", api);
                false
            }
        }
    }

    pub fn is_registered(&self, api: &str) -> bool {
        self.apis.read().contains_key(api)
    }

    pub fn owner(&self, api: &str) -> Option<String> {
        self.apis.read().get(api).cloned()
    }

    /// Exposed API names, sorted
    pub fn apis(&self) -> Vec<String> {
        let mut apis: Vec<String> = self.apis.read().keys().cloned().collect();
        apis.sort();
        apis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let listener = ApiListener::new();
        listener.register("ChargerSv1", "Charger").unwrap();
        // Re-registration by the owner is harmless
        listener.register("ChargerSv1", "Charger").unwrap();

        assert!(listener.is_registered("ChargerSv1"));
        assert_eq!(listener.owner("ChargerSv1").as_deref(), Some("Charger"));
        assert!(listener.unregister("ChargerSv1"));
        assert!(!listener.unregister("ChargerSv1"));
        assert!(listener.apis().is_empty());
    }

    #[test]
    fn test_conflicting_owner() {
        let listener = ApiListener::new();
        listener.register("CacheSv1", "Cache").unwrap();
        assert!(listener.register("CacheSv1", "Filter").is_err());
        assert_eq!(listener.owner("CacheSv1").as_deref(), Some("Cache"));
    }
}
