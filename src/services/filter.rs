use super::{partition_state, DataStoreConn, ServiceContext, CACHE, DATA_STORE, FILTER};
use crate::broadcast::StateSignal;
use crate::error::{Result, ServiceError};
use crate::service::{Dependency, Service, ServiceBase};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const FILTER_API: &str = "FilterSv1";
const FILTER_INDEX_PARTITION: &str = "filter_indexes";

/// Filter settings the subsystem evaluates against
#[derive(Debug, Clone, PartialEq)]
pub struct FilterIndex {
    pub indexed_selects: bool,
}

pub struct FilterService {
    base: ServiceBase<FilterIndex>,
    ctx: ServiceContext,
}

impl FilterService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            base: ServiceBase::new(FILTER.name()),
            ctx,
        }
    }

    pub fn index(&self) -> Option<Arc<FilterIndex>> {
        self.base.handle()
    }

    /// Current data store connection, resolved on every call
    pub fn data_store(&self) -> Option<Arc<DataStoreConn>> {
        self.ctx.registry.get(&DATA_STORE).ok()?.connection()
    }

    fn build_index(&self) -> Result<FilterIndex> {
        if self.data_store().is_none() {
            return Err(ServiceError::component(
                FILTER.name(),
                "data store has no connection",
            ));
        }

        Ok(FilterIndex {
            indexed_selects: self.ctx.config.current().filters.indexed_selects,
        })
    }
}

#[async_trait]
impl Service for FilterService {
    fn service_name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.begin_start()?;

        let prepared = async {
            self.ctx.waiter().wait_for(ctx, &self.dependencies()).await?;
            let index = self.build_index()?;
            self.ctx.listener.register(FILTER_API, FILTER.name())?;
            Ok::<_, ServiceError>(index)
        };

        match prepared.await {
            Ok(index) => {
                info!("Filters ready (indexed selects: {})", index.indexed_selects);
                self.base.finish_start(index);
                Ok(())
            }
            Err(e) => {
                self.base.abort_start();
                Err(e)
            }
        }
    }

    async fn reload(&self, _ctx: &CancellationToken) -> Result<()> {
        if !self.base.is_running() {
            return Err(ServiceError::not_running(self.base.name()));
        }

        let index = self.build_index()?;
        info!("Filters reloaded (indexed selects: {})", index.indexed_selects);
        self.base.swap_handle(index);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.base.begin_shutdown()?;
        self.ctx.listener.unregister(FILTER_API);
        self.base.finish_shutdown();
        Ok(())
    }

    fn should_run(&self) -> bool {
        self.ctx.config.current().filters.enabled
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn state_signal(&self, state: &str) -> Option<StateSignal> {
        self.base.signal(state)
    }

    /// Waits on the filter index partition when the cache preloads it
    fn dependencies(&self) -> Vec<Dependency> {
        let mut dependencies = vec![DATA_STORE.up()];
        let config = self.ctx.config.current();
        if config.caches.enabled
            && config
                .caches
                .partitions
                .iter()
                .any(|p| p == FILTER_INDEX_PARTITION)
        {
            dependencies.push(Dependency::new(
                CACHE.name(),
                partition_state(FILTER_INDEX_PARTITION),
            ));
        }
        dependencies
    }
}
