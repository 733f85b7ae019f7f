//! Routing of configuration-section changes to the services that must reload.

use crate::config::{
    SECTION_CACHES, SECTION_CHARGERS, SECTION_DATA_DB, SECTION_FILTERS, SECTION_GENERAL,
};
use crate::services::{CACHE, CHARGER, DATA_STORE, FILTER};
use std::collections::HashMap;
use tracing::debug;

/// A persisted configuration section changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    section: String,
}

impl ReloadEvent {
    pub fn new<S: Into<String>>(section: S) -> Self {
        Self {
            section: section.into(),
        }
    }

    pub fn section(&self) -> &str {
        &self.section
    }
}

/// Section id to affected service names
#[derive(Debug, Clone, Default)]
pub struct ReloadRouter {
    routes: HashMap<String, Vec<String>>,
}

impl ReloadRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes for the reference services shipped with this crate
    pub fn with_default_routes() -> Self {
        Self::new()
            .with_route(SECTION_DATA_DB, [DATA_STORE.name()])
            .with_route(SECTION_CACHES, [CACHE.name()])
            .with_route(SECTION_FILTERS, [FILTER.name()])
            .with_route(SECTION_CHARGERS, [CHARGER.name()])
            // Timeouts are read at the next start; nothing reloads eagerly.
            .with_route(SECTION_GENERAL, Vec::<&str>::new())
    }

    /// Add `services` to the targets of `section`
    pub fn with_route<I, S>(mut self, section: &str, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets = self.routes.entry(section.to_string()).or_default();
        for service in services {
            let service = service.into();
            if !targets.contains(&service) {
                targets.push(service);
            }
        }
        self
    }

    /// Services that must reload after `section` changed
    pub fn targets(&self, section: &str) -> &[String] {
        match self.routes.get(section) {
            Some(targets) => targets,
            None => {
                debug!("No reload route for section {}", section);
                &[]
            }
        }
    }

    pub fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        sections.sort_unstable();
        sections
    }
}
