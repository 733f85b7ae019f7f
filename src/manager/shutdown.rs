use super::{ComponentState, ServiceManager, ShutdownReport, ALL_SERVICES};
use crate::broadcast::StateSignal;
use crate::error::{Result, ServiceError};
use crate::service::{Dependency, Service};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

impl ServiceManager {
    /// Shut every running service down, dependents before dependencies.
    ///
    /// Each service waits for all of its running dependents to finish their
    /// own shutdown, then shuts down itself. Services still busy when
    /// `budget` runs out are abandoned and listed in the report.
    pub async fn shutdown_services(&self, budget: Duration) -> ShutdownReport {
        info!("Beginning graceful shutdown");

        // Unblock any start still waiting on dependencies
        self.cancel_activation();

        let deadline = Instant::now() + budget;
        let running: Vec<Arc<dyn Service>> = self
            .registry
            .services()
            .into_iter()
            .filter(|service| service.is_running())
            .collect();

        let mut report = ShutdownReport::default();
        if running.is_empty() {
            info!("No running services to stop");
            return report;
        }

        let dependents = running_dependents(&running, &self.started_with.read());
        let finished: HashMap<String, StateSignal> = running
            .iter()
            .map(|service| (service.service_name().to_string(), StateSignal::new()))
            .collect();

        let (done_sender, mut done_receiver) = mpsc::channel(running.len());
        for service in &running {
            let name = service.service_name().to_string();
            let wait_on: Vec<StateSignal> = dependents
                .get(&name)
                .map(|names| names.iter().map(|d| finished[d].clone()).collect())
                .unwrap_or_default();
            let own_signal = finished[&name].clone();
            let service = Arc::clone(service);
            let manager = self.clone();
            let done_sender = done_sender.clone();

            // Detached: dropping the handle on timeout abandons the task
            tokio::spawn(async move {
                for signal in wait_on {
                    signal.wait().await;
                }

                let lock = manager.service_lock(&name);
                let _guard = lock.lock().await;
                let result = manager.stop_one(&service).await;
                own_signal.fire();
                let _ = done_sender.send((name, result)).await;
            });
        }
        drop(done_sender);

        let mut pending: HashSet<String> = finished.keys().cloned().collect();
        while !pending.is_empty() {
            match timeout_at(deadline, done_receiver.recv()).await {
                Ok(Some((name, result))) => {
                    pending.remove(&name);
                    match result {
                        Ok(()) => report.stopped.push(name),
                        Err(e) => {
                            error!("Error stopping {} service: {}", name, e);
                            report.failed.push((name, e.to_string()));
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    for name in &pending {
                        warn!("Service {} did not stop within {:?}, abandoning", name, budget);
                        self.set_component_state(name, ComponentState::Failed);
                    }
                    break;
                }
            }
        }

        report.abandoned = pending.into_iter().collect();
        report.abandoned.sort();
        info!(
            "Graceful shutdown completed: {} stopped, {} failed, {} abandoned",
            report.stopped.len(),
            report.failed.len(),
            report.abandoned.len()
        );
        report
    }

    /// Stop a single service by name, or all of them for [`ALL_SERVICES`]
    pub async fn stop_service(&self, name: &str) -> Result<()> {
        if name == ALL_SERVICES {
            let budget = self.config.current().general.shutdown_timeout();
            let report = self.shutdown_services(budget).await;
            if !report.abandoned.is_empty() {
                return Err(ServiceError::ShutdownTimeout {
                    services: report.abandoned,
                });
            }
            return Ok(());
        }

        let service = self.lookup_service(name)?;
        let lock = self.service_lock(name);
        let _guard = lock.lock().await;
        self.stop_one(&service).await
    }

    /// Run one service's shutdown and track its state. Callers hold its lock.
    pub(super) async fn stop_one(&self, service: &Arc<dyn Service>) -> Result<()> {
        let name = service.service_name();
        info!("Stopping {} service", name);
        self.set_component_state(name, ComponentState::Stopping);

        match service.shutdown().await {
            Ok(()) => {
                self.set_component_state(name, ComponentState::Stopped);
                info!("{} service stopped", name);
                Ok(())
            }
            Err(ServiceError::NotRunning { .. }) => {
                debug!("{} service was not running", name);
                self.set_component_state(name, ComponentState::Stopped);
                Ok(())
            }
            Err(e) => {
                self.set_component_state(name, ComponentState::Failed);
                Err(e)
            }
        }
    }
}

/// For each running service, the running services that depend on it.
///
/// Edges come from the dependency set a service started with, not its live
/// one, since configuration may have changed since.
fn running_dependents(
    running: &[Arc<dyn Service>],
    started_with: &HashMap<String, Vec<Dependency>>,
) -> HashMap<String, Vec<String>> {
    let names: HashSet<&str> = running.iter().map(|s| s.service_name()).collect();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for service in running {
        let name = service.service_name();
        let dependencies = started_with
            .get(name)
            .cloned()
            .unwrap_or_else(|| service.dependencies());
        for dependency in dependencies {
            if dependency.service == name || !names.contains(dependency.service.as_str()) {
                continue;
            }
            let entry = dependents.entry(dependency.service).or_default();
            if !entry.iter().any(|d| d == name) {
                entry.push(name.to_string());
            }
        }
    }
    dependents
}
