use super::{
    DataStoreConn, DataStoreService, FilterService, ServiceContext, CACHE, CHARGER, DATA_STORE,
    FILTER,
};
use crate::broadcast::{StateSignal, STATE_UP};
use crate::error::{Result, ServiceError};
use crate::service::{Dependency, Service, ServiceBase};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CHARGER_API: &str = "ChargerSv1";

/// Collaborators the charger resolved while starting
pub struct ChargerHandle {
    pub filter: Arc<FilterService>,
    pub data_store: Arc<DataStoreService>,
    pub attributes_conns: Vec<String>,
}

impl ChargerHandle {
    /// Live data store connection, following data store reloads
    pub fn connection(&self) -> Option<Arc<DataStoreConn>> {
        self.data_store.connection()
    }
}

pub struct ChargerService {
    base: ServiceBase<ChargerHandle>,
    ctx: ServiceContext,
    ready_dependencies: Mutex<Vec<String>>,
}

impl ChargerService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            base: ServiceBase::new(CHARGER.name()),
            ctx,
            ready_dependencies: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> Option<Arc<ChargerHandle>> {
        self.base.handle()
    }

    /// Dependencies that were already `UP` when the last start resolved them
    pub fn ready_dependencies(&self) -> Vec<String> {
        self.ready_dependencies.lock().clone()
    }

    fn build_handle(&self, filter: Arc<FilterService>) -> Result<ChargerHandle> {
        let data_store = self.ctx.registry.get(&DATA_STORE)?;
        if data_store.connection().is_none() {
            return Err(ServiceError::component(
                CHARGER.name(),
                "data store has no connection",
            ));
        }

        Ok(ChargerHandle {
            filter,
            data_store,
            attributes_conns: self.ctx.config.current().chargers.attributes_conns.clone(),
        })
    }

    async fn prepare(&self, ctx: &CancellationToken) -> Result<ChargerHandle> {
        let resolved = self.ctx.waiter().wait_for(ctx, &self.dependencies()).await?;

        let ready: Vec<String> = resolved
            .names()
            .into_iter()
            .filter(|name| {
                resolved
                    .lookup(name)
                    .and_then(|s| s.state_signal(STATE_UP))
                    .map_or(false, |signal| signal.is_fired())
            })
            .map(str::to_string)
            .collect();
        debug!("Charger resolved {:?}", ready);
        *self.ready_dependencies.lock() = ready;

        let filter = resolved.get(&FILTER)?;
        let handle = self.build_handle(filter)?;
        self.ctx.listener.register(CHARGER_API, CHARGER.name())?;
        Ok(handle)
    }
}

#[async_trait]
impl Service for ChargerService {
    fn service_name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.begin_start()?;

        match self.prepare(ctx).await {
            Ok(handle) => {
                info!(
                    "Charger ready with {} attribute connections",
                    handle.attributes_conns.len()
                );
                self.base.finish_start(handle);
                Ok(())
            }
            Err(e) => {
                self.base.abort_start();
                Err(e)
            }
        }
    }

    async fn reload(&self, _ctx: &CancellationToken) -> Result<()> {
        let filter = self
            .base
            .handle()
            .map(|h| Arc::clone(&h.filter))
            .ok_or_else(|| ServiceError::not_running(self.base.name()))?;

        let handle = self.build_handle(filter)?;
        info!(
            "Charger reloaded with {} attribute connections",
            handle.attributes_conns.len()
        );
        self.base.swap_handle(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.base.begin_shutdown()?;
        self.ctx.listener.unregister(CHARGER_API);
        self.base.finish_shutdown();
        Ok(())
    }

    fn should_run(&self) -> bool {
        self.ctx.config.current().chargers.enabled
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn state_signal(&self, state: &str) -> Option<StateSignal> {
        self.base.signal(state)
    }

    fn dependencies(&self) -> Vec<Dependency> {
        let mut dependencies = Vec::with_capacity(3);
        if self.ctx.config.current().caches.enabled {
            dependencies.push(CACHE.up());
        }
        dependencies.push(FILTER.up());
        dependencies.push(DATA_STORE.up());
        dependencies
    }
}
