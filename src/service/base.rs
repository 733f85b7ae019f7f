use crate::broadcast::{StateBroadcast, StateSignal, STATE_DOWN, STATE_UP};
use crate::error::{Result, ServiceError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Shared lifecycle plumbing for service implementations.
///
/// Owns the running flag, the live subsystem handle and the state signals
/// behind one lock per service. `H` is the subsystem handle swapped in on
/// start and reload.
pub struct ServiceBase<H> {
    name: String,
    lifecycle: RwLock<Lifecycle>,
    handle: RwLock<Option<Arc<H>>>,
    states: StateBroadcast,
}

impl<H> ServiceBase<H> {
    /// Create a base publishing only `UP` and `DOWN`
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self::with_states(name, Vec::<String>::new())
    }

    /// Create a base publishing `UP`, `DOWN` and the given extra states
    pub fn with_states<S, I, T>(name: S, extra_states: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let states = [STATE_UP.to_string(), STATE_DOWN.to_string()]
            .into_iter()
            .chain(extra_states.into_iter().map(Into::into));

        Self {
            name: name.into(),
            lifecycle: RwLock::new(Lifecycle::Stopped),
            handle: RwLock::new(None),
            states: StateBroadcast::new(states),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.read() == Lifecycle::Running
    }

    /// Claim the service for starting.
    ///
    /// Fails with `AlreadyRunning` unless the service is fully stopped.
    pub fn begin_start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle != Lifecycle::Stopped {
            return Err(ServiceError::already_running(&self.name));
        }
        *lifecycle = Lifecycle::Starting;
        Ok(())
    }

    /// Undo [`begin_start`](Self::begin_start) after a failed start
    pub fn abort_start(&self) {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == Lifecycle::Starting {
            *lifecycle = Lifecycle::Stopped;
        }
        // Partial states fired before the failure must not leak into the next attempt
        self.states.reset_all_except(STATE_DOWN);
    }

    /// Install the subsystem handle, mark running and fire `UP`
    pub fn finish_start(&self, handle: H) {
        *self.handle.write() = Some(Arc::new(handle));
        *self.lifecycle.write() = Lifecycle::Running;

        self.states.reset(STATE_DOWN);
        self.states.fire(STATE_UP);
        info!("Service {} is up", self.name);
    }

    /// Claim the service for stopping and take its subsystem handle.
    ///
    /// Fails with `NotRunning` unless the service is running.
    pub fn begin_shutdown(&self) -> Result<Option<Arc<H>>> {
        {
            let mut lifecycle = self.lifecycle.write();
            if *lifecycle != Lifecycle::Running {
                return Err(ServiceError::not_running(&self.name));
            }
            *lifecycle = Lifecycle::Stopping;
        }
        Ok(self.handle.write().take())
    }

    /// Mark stopped, re-arm `UP` and fire `DOWN`
    pub fn finish_shutdown(&self) {
        *self.lifecycle.write() = Lifecycle::Stopped;

        self.states.reset_all_except(STATE_DOWN);
        self.states.fire(STATE_DOWN);
        info!("Service {} is down", self.name);
    }

    /// Current subsystem handle
    pub fn handle(&self) -> Option<Arc<H>> {
        self.handle.read().clone()
    }

    /// Atomically replace the subsystem handle, returning the previous one
    pub fn swap_handle(&self, handle: H) -> Option<Arc<H>> {
        let previous = self.handle.write().replace(Arc::new(handle));
        debug!("Service {} swapped its subsystem handle", self.name);
        previous
    }

    /// Fire a service-specific state such as partial readiness
    pub fn fire(&self, state: &str) -> bool {
        self.states.fire(state)
    }

    pub fn signal(&self, state: &str) -> Option<StateSignal> {
        self.states.signal(state)
    }

    pub fn states(&self) -> &StateBroadcast {
        &self.states
    }
}
