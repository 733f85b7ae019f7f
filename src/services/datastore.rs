use super::{ServiceContext, DATA_STORE};
use crate::broadcast::StateSignal;
use crate::config::DataDbConfig;
use crate::error::{Result, ServiceError};
use crate::service::{Service, ServiceBase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Live connection to the data store backend
#[derive(Debug, Clone)]
pub struct DataStoreConn {
    pub address: String,
    pub db_type: String,
    pub connected_at: DateTime<Utc>,
}

impl DataStoreConn {
    fn connect(config: &DataDbConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(ServiceError::fatal(
                DATA_STORE.name(),
                "data_db host is not configured",
            ));
        }
        if config.port == 0 {
            return Err(ServiceError::fatal(
                DATA_STORE.name(),
                format!("data_db {} is unreachable", config.address()),
            ));
        }

        debug!("Connected to {}", config.address());
        Ok(Self {
            address: config.address(),
            db_type: config.db_type.clone(),
            connected_at: Utc::now(),
        })
    }
}

/// Mandatory storage service every other service builds on
pub struct DataStoreService {
    base: ServiceBase<DataStoreConn>,
    ctx: ServiceContext,
}

impl DataStoreService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            base: ServiceBase::new(DATA_STORE.name()),
            ctx,
        }
    }

    /// Current connection, if running
    pub fn connection(&self) -> Option<Arc<DataStoreConn>> {
        self.base.handle()
    }
}

#[async_trait]
impl Service for DataStoreService {
    fn service_name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.begin_start()?;
        if ctx.is_cancelled() {
            self.base.abort_start();
            return Err(ServiceError::Cancelled);
        }

        let config = self.ctx.config.current();
        match DataStoreConn::connect(&config.data_db) {
            Ok(conn) => {
                info!("Data store connected to {}", conn.address);
                self.base.finish_start(conn);
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

        // Keep serving on the old connection if the new one cannot be opened
        let config = self.ctx.config.current();
        let conn = DataStoreConn::connect(&config.data_db)?;
        let address = conn.address.clone();
        if let Some(previous) = self.base.swap_handle(conn) {
            info!("Data store moved from {} to {}", previous.address, address);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let conn = self.base.begin_shutdown()?;
        if let Some(conn) = conn {
            info!("Closing data store connection to {}", conn.address);
        }
        self.base.finish_shutdown();
        Ok(())
    }

    fn should_run(&self) -> bool {
        true
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    fn state_signal(&self, state: &str) -> Option<StateSignal> {
        self.base.signal(state)
    }

    fn is_critical(&self) -> bool {
        true
    }
}
