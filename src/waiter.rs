//! Blocking multi-dependency wait used at the top of every `start`.

use crate::error::{Result, ServiceError};
use crate::registry::{downcast, ServiceRegistry};
use crate::service::{Dependency, Service, ServiceKey};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Services resolved by a successful wait, in request order
#[derive(Clone, Default)]
pub struct ResolvedDependencies {
    services: Vec<Arc<dyn Service>>,
}

impl ResolvedDependencies {
    /// Typed access to a resolved dependency
    pub fn get<S: Service>(&self, key: &ServiceKey<S>) -> Result<Arc<S>> {
        let service = self.lookup(key.name()).ok_or_else(|| ServiceError::NotFound {
            service: key.name().to_string(),
        })?;
        downcast(service)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services
            .iter()
            .find(|service| service.service_name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.service_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Resolves dependency sets against a registry with a bounded wait
#[derive(Clone)]
pub struct DependencyWaiter {
    registry: Arc<ServiceRegistry>,
    timeout: Duration,
}

impl DependencyWaiter {
    pub fn new(registry: Arc<ServiceRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until every service in `names` reached `state`
    pub async fn wait(
        &self,
        ctx: &CancellationToken,
        state: &str,
        names: &[&str],
    ) -> Result<ResolvedDependencies> {
        wait_for_services(ctx, state, names, &self.registry, self.timeout).await
    }

    /// Wait until every dependency reached its own required state
    pub async fn wait_for(
        &self,
        ctx: &CancellationToken,
        dependencies: &[Dependency],
    ) -> Result<ResolvedDependencies> {
        wait_for_dependencies(ctx, dependencies, &self.registry, self.timeout).await
    }
}

/// Block until every service in `names` reached `state`, `timeout` elapses
/// or `ctx` is cancelled.
pub async fn wait_for_services(
    ctx: &CancellationToken,
    state: &str,
    names: &[&str],
    registry: &ServiceRegistry,
    timeout: Duration,
) -> Result<ResolvedDependencies> {
    let dependencies: Vec<Dependency> = names
        .iter()
        .map(|name| Dependency::new(*name, state))
        .collect();
    wait_for_dependencies(ctx, &dependencies, registry, timeout).await
}

/// Block until every dependency reached its state.
///
/// All dependencies are awaited concurrently against one deadline. The first
/// timeout aborts the wait and names the dependency that was missing.
pub async fn wait_for_dependencies(
    ctx: &CancellationToken,
    dependencies: &[Dependency],
    registry: &ServiceRegistry,
    timeout: Duration,
) -> Result<ResolvedDependencies> {
    if dependencies.is_empty() {
        return Ok(ResolvedDependencies::default());
    }

    let deadline = Instant::now() + timeout;
    let waits = dependencies
        .iter()
        .map(|dependency| wait_for_dependency(dependency, registry, deadline, timeout));

    tokio::select! {
        biased;
        _ = ctx.cancelled() => {
            debug!("Dependency wait cancelled");
            Err(ServiceError::Cancelled)
        }
        resolved = try_join_all(waits) => {
            resolved.map(|services| ResolvedDependencies { services })
        }
    }
}

async fn wait_for_dependency(
    dependency: &Dependency,
    registry: &ServiceRegistry,
    deadline: Instant,
    timeout: Duration,
) -> Result<Arc<dyn Service>> {
    let timed_out = |registered: bool| {
        warn!(
            "Timed out waiting for {} (registered: {})",
            dependency, registered
        );
        ServiceError::DependencyTimeout {
            dependency: dependency.service.clone(),
            state: dependency.state.clone(),
            timeout,
            registered,
        }
    };

    let service = timeout_at(deadline, registry.wait_registered(&dependency.service))
        .await
        .map_err(|_| timed_out(false))?;

    let signal = service
        .state_signal(&dependency.state)
        .ok_or_else(|| ServiceError::UnknownState {
            service: dependency.service.clone(),
            state: dependency.state.clone(),
        })?;

    timeout_at(deadline, signal.wait())
        .await
        .map_err(|_| timed_out(true))?;

    debug!("Dependency {} satisfied", dependency);
    Ok(service)
}
