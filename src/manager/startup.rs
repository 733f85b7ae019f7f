use super::{ComponentState, ServiceManager, StartupReport, ALL_SERVICES};
use crate::error::{Result, ServiceError};
use crate::service::Service;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

impl ServiceManager {
    /// Start every service whose `should_run` holds, all concurrently.
    ///
    /// Ordering comes only from each service's own dependency waits. A fatal
    /// error or a failing critical service cancels the activation token so
    /// every other in-flight start aborts, and that error is returned. A run
    /// after a cancelled activation (failed start, shutdown) gets a fresh one.
    pub async fn start_services(&self) -> Result<StartupReport> {
        let activation = self.activate();
        let span = info_span!("startup", activation = %activation.id);
        self.start_all(activation.token).instrument(span).await
    }

    async fn start_all(&self, token: CancellationToken) -> Result<StartupReport> {
        info!("Starting services");
        let mut report = StartupReport::default();
        let mut tasks = Vec::new();

        for service in self.registry.services() {
            let name = service.service_name().to_string();
            if !service.should_run() {
                debug!("Service {} disabled by configuration", name);
                report.skipped.push(name);
                continue;
            }

            let manager = self.clone();
            let token = token.clone();
            let task = tokio::spawn(
                async move {
                    let lock = manager.service_lock(service.service_name());
                    let _guard = lock.lock().await;
                    manager.start_one(&service, &token).await
                }
                .in_current_span(),
            );
            tasks.push((name, task));
        }

        let mut abort = None;
        for (name, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(ServiceError::component(&name, format!("start task failed: {}", e))),
            };

            match result {
                Ok(()) | Err(ServiceError::AlreadyRunning { .. }) => report.started.push(name),
                Err(e) => {
                    report.failed.push((name.clone(), e.to_string()));
                    let critical = self
                        .registry
                        .lookup(&name)
                        .map(|service| service.is_critical())
                        .unwrap_or(false);
                    let cancelled = matches!(e, ServiceError::Cancelled);
                    if abort.is_none() && !cancelled && (e.is_fatal() || critical) {
                        abort = Some(e);
                    }
                }
            }
        }

        if let Some(e) = abort {
            error!("Startup aborted: {}", e);
            return Err(e);
        }
        if token.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        report.started.sort();
        report.skipped.sort();
        info!(
            "Startup finished: {} started, {} skipped, {} failed",
            report.started.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Start a single service by name, or every enabled one for [`ALL_SERVICES`]
    pub async fn start_service(&self, name: &str) -> Result<()> {
        if name == ALL_SERVICES {
            return self.start_services().await.map(|_| ());
        }

        let service = self.lookup_service(name)?;
        let activation = self.activate();
        let lock = self.service_lock(name);
        let _guard = lock.lock().await;
        self.start_one(&service, &activation.token).await
    }

    /// Run one service's start under `token` and track its state. Callers
    /// hold its lock.
    pub(super) async fn start_one(
        &self,
        service: &Arc<dyn Service>,
        token: &CancellationToken,
    ) -> Result<()> {
        let name = service.service_name();
        if service.is_running() {
            debug!("Service {} already running", name);
            return Err(ServiceError::already_running(name));
        }

        self.set_component_state(name, ComponentState::Starting);
        info!("Starting {} service", name);
        let dependencies = service.dependencies();

        match service.start(token).await {
            Ok(()) => {
                self.started_with
                    .write()
                    .insert(name.to_string(), dependencies);
                self.set_component_state(name, ComponentState::Running);
                info!("Service {} started", name);
                Ok(())
            }
            Err(e) => {
                self.set_component_state(name, ComponentState::Failed);
                if e.is_fatal() || service.is_critical() {
                    error!("Critical service {} failed to start: {}", name, e);
                    token.cancel();
                } else {
                    warn!("Service {} failed to start: {}", name, e);
                }
                Err(e)
            }
        }
    }

    pub(super) fn lookup_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.registry.lookup(name).ok_or_else(|| ServiceError::NotFound {
            service: name.to_string(),
        })
    }
}
