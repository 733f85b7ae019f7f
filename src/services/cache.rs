use super::{ServiceContext, CACHE, DATA_STORE};
use crate::broadcast::StateSignal;
use crate::error::{Result, ServiceError};
use crate::service::{Dependency, Service, ServiceBase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CACHE_API: &str = "CacheSv1";

/// State fired once `partition` finished preloading
pub fn partition_state(partition: &str) -> String {
    format!("LOADED:{}", partition)
}

/// Preloaded cache partitions
#[derive(Debug, Clone)]
pub struct CacheHandle {
    pub partitions: Vec<String>,
    pub source: String,
    pub loaded_at: DateTime<Utc>,
}

/// Cache preloaded from the data store, one readiness state per partition.
///
/// Reload has no incremental path: the cache is shut down and started again.
pub struct CacheService {
    base: ServiceBase<CacheHandle>,
    ctx: ServiceContext,
    partitions: Vec<String>,
}

impl CacheService {
    pub fn new(ctx: ServiceContext) -> Self {
        let partitions = ctx.config.current().caches.partitions.clone();
        let states: Vec<String> = partitions.iter().map(|p| partition_state(p)).collect();

        Self {
            base: ServiceBase::with_states(CACHE.name(), states),
            ctx,
            partitions,
        }
    }

    pub fn cache(&self) -> Option<std::sync::Arc<CacheHandle>> {
        self.base.handle()
    }

    async fn load(&self, ctx: &CancellationToken) -> Result<CacheHandle> {
        let resolved = self.ctx.waiter().wait_for(ctx, &self.dependencies()).await?;
        let data_store = resolved.get(&DATA_STORE)?;
        let conn = data_store
            .connection()
            .ok_or_else(|| ServiceError::component(CACHE.name(), "data store has no connection"))?;

        let configured = self.ctx.config.current().caches.partitions.clone();
        let mut loaded = Vec::new();
        for partition in configured {
            if ctx.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            if !self.partitions.contains(&partition) {
                warn!("Cache partition {} added after construction, loading without a state", partition);
            } else {
                self.base.fire(&partition_state(&partition));
            }
            debug!("Cache partition {} loaded from {}", partition, conn.address);
            loaded.push(partition);
        }

        Ok(CacheHandle {
            partitions: loaded,
            source: conn.address.clone(),
            loaded_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Service for CacheService {
    fn service_name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.begin_start()?;

        let handle = match self.load(ctx).await {
            Ok(handle) => handle,
            Err(e) => {
                self.base.abort_start();
                return Err(e);
            }
        };

        if let Err(e) = self.ctx.listener.register(CACHE_API, CACHE.name()) {
            self.base.abort_start();
            return Err(e);
        }

        info!("Cache loaded {} partitions", handle.partitions.len());
        self.base.finish_start(handle);
        Ok(())
    }

    async fn reload(&self, ctx: &CancellationToken) -> Result<()> {
        self.shutdown().await?;
        self.start(ctx).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.base.begin_shutdown()?;
        self.ctx.listener.unregister(CACHE_API);
        self.base.finish_shutdown();
        Ok(())
    }

    fn should_run(&self) -> bool {
        self.ctx.config.current().caches.enabled
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn state_signal(&self, state: &str) -> Option<StateSignal> {
        self.base.signal(state)
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![DATA_STORE.up()]
    }
}
