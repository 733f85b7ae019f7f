use super::{ComponentState, ServiceManager, ServiceStatus, ALL_SERVICES};
use crate::error::{Result, ServiceError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

impl ServiceManager {
    /// Update component state
    pub fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut states = self.component_states.write();
        states.insert(component.to_string(), (state, Utc::now()));
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    /// Get component state
    pub fn component_state(&self, component: &str) -> Option<ComponentState> {
        let states = self.component_states.read();
        states.get(component).map(|(state, _)| *state)
    }

    /// Get all component states
    pub fn component_states(&self) -> HashMap<String, ComponentState> {
        let states = self.component_states.read();
        states
            .iter()
            .map(|(name, (state, _))| (name.clone(), *state))
            .collect()
    }

    /// Status of `name`, or of every service for [`ALL_SERVICES`]
    pub fn service_status(&self, name: &str) -> Result<Vec<ServiceStatus>> {
        let services = if name == ALL_SERVICES {
            let mut services = self.registry.services();
            services.sort_by(|a, b| a.service_name().cmp(b.service_name()));
            services
        } else {
            vec![self
                .registry
                .lookup(name)
                .ok_or_else(|| ServiceError::NotFound {
                    service: name.to_string(),
                })?]
        };

        let states = self.component_states.read();
        Ok(services
            .into_iter()
            .map(|service| {
                let name = service.service_name().to_string();
                let (state, since): (ComponentState, DateTime<Utc>) = states
                    .get(&name)
                    .copied()
                    .unwrap_or((ComponentState::Registered, Utc::now()));
                ServiceStatus {
                    running: service.is_running(),
                    should_run: service.should_run(),
                    name,
                    state,
                    since,
                }
            })
            .collect())
    }
}
