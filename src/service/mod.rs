//! The contract every managed service implements.

mod base;

#[cfg(test)]
pub(crate) mod mock;

pub use base::ServiceBase;

use crate::broadcast::{StateSignal, STATE_UP};
use crate::error::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Upcast of a concrete service into `Any` for typed registry lookups
pub trait IntoAny: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> IntoAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A long-running subsystem driven by the [`ServiceManager`](crate::ServiceManager)
#[async_trait]
pub trait Service: IntoAny {
    /// Stable identifier, used as registry key and in dependency sets
    fn service_name(&self) -> &str;

    /// Wait for dependencies, initialize the subsystem and fire `UP`.
    ///
    /// Returns [`ServiceError::AlreadyRunning`](crate::ServiceError::AlreadyRunning)
    /// without side effects when already running.
    async fn start(&self, ctx: &CancellationToken) -> Result<()>;

    /// Re-read live configuration and adjust the running subsystem
    async fn reload(&self, ctx: &CancellationToken) -> Result<()>;

    /// Release resources and fire `DOWN`
    async fn shutdown(&self) -> Result<()>;

    /// Whether the live configuration wants this service running
    fn should_run(&self) -> bool;

    fn is_running(&self) -> bool;

    /// Current signal for a named state
    fn state_signal(&self, state: &str) -> Option<StateSignal>;

    /// States this service needs from others before it can start
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// A failing critical service aborts the whole activation
    fn is_critical(&self) -> bool {
        false
    }
}

/// A (service, state) pair a service waits on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub service: String,
    pub state: String,
}

impl Dependency {
    pub fn new<S: Into<String>, T: Into<String>>(service: S, state: T) -> Self {
        Self {
            service: service.into(),
            state: state.into(),
        }
    }

    /// Dependency on the `UP` state of `service`
    pub fn up<S: Into<String>>(service: S) -> Self {
        Self::new(service, STATE_UP)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.state)
    }
}

/// Name of a service bound to its concrete type
pub struct ServiceKey<S> {
    name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> ServiceKey<S> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Dependency on the `UP` state of this service
    pub fn up(&self) -> Dependency {
        Dependency::up(self.name)
    }
}

impl<S> Clone for ServiceKey<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for ServiceKey<S> {}

impl<S> fmt::Debug for ServiceKey<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}
