use super::{Dependency, Service, ServiceBase};
use crate::broadcast::StateSignal;
use crate::error::{Result, ServiceError};
use crate::registry::ServiceRegistry;
use crate::waiter::wait_for_dependencies;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a mock start should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartFailure {
    Fatal,
    Component,
}

/// Shared, ordered record of lifecycle calls across mocks
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

/// Configurable service for lifecycle tests without real subsystems
pub(crate) struct MockService {
    base: ServiceBase<()>,
    registry: Option<Arc<ServiceRegistry>>,
    dependencies: Mutex<Vec<Dependency>>,
    connect_timeout: Duration,
    should_run: AtomicBool,
    critical: bool,
    start_failure: Option<StartFailure>,
    start_delay: Duration,
    reload_delay: Duration,
    shutdown_delay: Duration,
    journal: Option<Journal>,
    starts: AtomicUsize,
    reloads: AtomicUsize,
    shutdowns: AtomicUsize,
    reload_active: AtomicBool,
    reload_overlap: AtomicBool,
    observed_ready: Mutex<Vec<String>>,
}

impl MockService {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            base: ServiceBase::new(name),
            registry: None,
            dependencies: Mutex::new(Vec::new()),
            connect_timeout: Duration::from_secs(1),
            should_run: AtomicBool::new(true),
            critical: false,
            start_failure: None,
            start_delay: Duration::ZERO,
            reload_delay: Duration::ZERO,
            shutdown_delay: Duration::ZERO,
            journal: None,
            starts: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            reload_active: AtomicBool::new(false),
            reload_overlap: AtomicBool::new(false),
            observed_ready: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_dependencies(
        mut self,
        registry: Arc<ServiceRegistry>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        self.registry = Some(registry);
        self.dependencies = Mutex::new(dependencies);
        self
    }

    pub(crate) fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub(crate) fn disabled(self) -> Self {
        self.should_run.store(false, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_start(mut self, failure: StartFailure) -> Self {
        self.start_failure = Some(failure);
        self
    }

    pub(crate) fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub(crate) fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    pub(crate) fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub(crate) fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub(crate) fn into_service(self) -> Arc<dyn Service> {
        Arc::new(self)
    }

    pub(crate) fn base(&self) -> &ServiceBase<()> {
        &self.base
    }

    pub(crate) fn set_should_run(&self, should_run: bool) {
        self.should_run.store(should_run, Ordering::SeqCst);
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Change the declared dependencies of a running mock
    pub(crate) fn set_dependencies(&self, dependencies: Vec<Dependency>) {
        *self.dependencies.lock() = dependencies;
    }

    pub(crate) fn reload_overlapped(&self) -> bool {
        self.reload_overlap.load(Ordering::SeqCst)
    }

    /// Dependencies whose state had fired when the wait returned
    pub(crate) fn observed_ready(&self) -> Vec<String> {
        self.observed_ready.lock().clone()
    }

    fn record(&self, action: &str) {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .push(format!("{}:{}", action, self.base.name()));
        }
    }

    async fn start_inner(&self, ctx: &CancellationToken) -> Result<()> {
        if let Some(registry) = &self.registry {
            let dependencies = self.dependencies.lock().clone();
            let resolved =
                wait_for_dependencies(ctx, &dependencies, registry, self.connect_timeout).await?;

            let mut observed = self.observed_ready.lock();
            for dependency in &dependencies {
                let ready = resolved
                    .lookup(&dependency.service)
                    .and_then(|service| service.state_signal(&dependency.state))
                    .map(|signal| signal.is_fired())
                    .unwrap_or(false);
                if ready {
                    observed.push(dependency.service.clone());
                }
            }
        }

        if !self.start_delay.is_zero() {
            tokio::select! {
                _ = ctx.cancelled() => return Err(ServiceError::Cancelled),
                _ = tokio::time::sleep(self.start_delay) => {}
            }
        }

        match self.start_failure {
            Some(StartFailure::Fatal) => Err(ServiceError::fatal(self.base.name(), "mock fatal")),
            Some(StartFailure::Component) => {
                Err(ServiceError::component(self.base.name(), "mock failure"))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Service for MockService {
    fn service_name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.begin_start()?;
        self.starts.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.start_inner(ctx).await {
            self.base.abort_start();
            return Err(e);
        }

        self.record("start");
        self.base.finish_start(());
        Ok(())
    }

    async fn reload(&self, _ctx: &CancellationToken) -> Result<()> {
        if !self.base.is_running() {
            return Err(ServiceError::not_running(self.base.name()));
        }

        if self.reload_active.swap(true, Ordering::SeqCst) {
            self.reload_overlap.store(true, Ordering::SeqCst);
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        debug!("Mock {} reloading", self.base.name());

        if !self.reload_delay.is_zero() {
            tokio::time::sleep(self.reload_delay).await;
        }

        self.record("reload");
        self.reload_active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.base.begin_shutdown()?;
        self.shutdowns.fetch_add(1, Ordering::SeqCst);

        if !self.shutdown_delay.is_zero() {
            tokio::time::sleep(self.shutdown_delay).await;
        }

        self.record("shutdown");
        self.base.finish_shutdown();
        Ok(())
    }

    fn should_run(&self) -> bool {
        self.should_run.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn state_signal(&self, state: &str) -> Option<StateSignal> {
        self.base.signal(state)
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.dependencies.lock().clone()
    }

    fn is_critical(&self) -> bool {
        self.critical
    }
}
