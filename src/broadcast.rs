//! Named one-shot state signals used for dependency signaling between services.
//!
//! A [`StateSignal`] fires at most once and releases every present and future
//! waiter. Re-arming never reopens a fired signal: [`StateBroadcast::reset`]
//! installs a fresh instance in its place.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Service reached its running state
pub const STATE_UP: &str = "UP";

/// Service released its resources
pub const STATE_DOWN: &str = "DOWN";

/// One-shot, multi-waiter event
#[derive(Debug, Clone, Default)]
pub struct StateSignal {
    fired: Arc<AtomicBool>,
    token: CancellationToken,
}

impl StateSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Whether both handles observe the same underlying event
    pub fn same_as(&self, other: &StateSignal) -> bool {
        Arc::ptr_eq(&self.fired, &other.fired)
    }
}

/// Per-service map from state name to its current [`StateSignal`]
#[derive(Debug)]
pub struct StateBroadcast {
    signals: RwLock<HashMap<String, StateSignal>>,
}

impl StateBroadcast {
    /// Create a broadcast for the declared set of state names
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let signals = states
            .into_iter()
            .map(|state| (state.into(), StateSignal::new()))
            .collect();

        Self {
            signals: RwLock::new(signals),
        }
    }

    /// Create a broadcast with only the `UP` and `DOWN` states
    pub fn with_default_states() -> Self {
        Self::new([STATE_UP, STATE_DOWN])
    }

    /// Current signal for `state`, if the state was declared
    pub fn signal(&self, state: &str) -> Option<StateSignal> {
        self.signals.read().get(state).cloned()
    }

    /// Fire the current signal for `state`.
    ///
    /// Returns `false` when the state is unknown or already fired in this cycle.
    pub fn fire(&self, state: &str) -> bool {
        let fired = self
            .signals
            .read()
            .get(state)
            .map(StateSignal::fire)
            .unwrap_or(false);

        if fired {
            debug!("State {} fired", state);
        }
        fired
    }

    /// Re-arm `state` for the next activation cycle.
    ///
    /// A fresh signal replaces a fired one. An unfired signal is kept so that
    /// waiters already holding it are not stranded. Returns `true` when a new
    /// signal was installed.
    pub fn reset(&self, state: &str) -> bool {
        let mut signals = self.signals.write();
        match signals.get(state) {
            Some(signal) if signal.is_fired() => {
                signals.insert(state.to_string(), StateSignal::new());
                debug!("State {} re-armed", state);
                true
            }
            _ => false,
        }
    }

    /// Re-arm every declared state except `keep`
    pub fn reset_all_except(&self, keep: &str) {
        let names: Vec<String> = self
            .signals
            .read()
            .keys()
            .filter(|name| name.as_str() != keep)
            .cloned()
            .collect();

        for name in names {
            self.reset(&name);
        }
    }

    pub fn is_fired(&self, state: &str) -> bool {
        self.signals
            .read()
            .get(state)
            .map(StateSignal::is_fired)
            .unwrap_or(false)
    }

    /// Declared state names
    pub fn states(&self) -> Vec<String> {
        let mut names: Vec<String> = self.signals.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StateBroadcast {
    fn default() -> Self {
        Self::with_default_states()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fire_releases_waiters_before_and_after() {
        let signal = StateSignal::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let signal = signal.clone();
            let released = Arc::clone(&released);
            handles.push(tokio::spawn(async move {
                signal.wait().await;
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert!(signal.fire());

        for _ in 0..5 {
            let signal = signal.clone();
            let released = Arc::clone(&released);
            handles.push(tokio::spawn(async move {
                signal.wait().await;
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            timeout(Duration::from_secs(1), handle)
                .await
                .expect("waiter should be released")
                .unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 13);
    }

    #[test]
    fn test_fire_at_most_once() {
        let signal = StateSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[test]
    fn test_unknown_state() {
        let states = StateBroadcast::with_default_states();
        assert!(states.signal("LOADED").is_none());
        assert!(!states.fire("LOADED"));
        assert!(!states.reset("LOADED"));
    }

    #[test]
    fn test_reset_installs_fresh_signal_only_after_fire() {
        let states = StateBroadcast::with_default_states();
        let original = states.signal(STATE_UP).unwrap();

        // Unfired signals stay in place
        assert!(!states.reset(STATE_UP));
        assert!(states.signal(STATE_UP).unwrap().same_as(&original));

        assert!(states.fire(STATE_UP));
        assert!(states.reset(STATE_UP));

        let fresh = states.signal(STATE_UP).unwrap();
        assert!(!fresh.same_as(&original));
        assert!(!fresh.is_fired());
        assert!(original.is_fired());
    }

    #[tokio::test]
    async fn test_old_waiter_released_after_reset() {
        let states = StateBroadcast::with_default_states();
        let old = states.signal(STATE_DOWN).unwrap();
        states.fire(STATE_DOWN);
        states.reset(STATE_DOWN);

        timeout(Duration::from_millis(100), old.wait())
            .await
            .expect("fired signal stays fired");
        assert!(!states.is_fired(STATE_DOWN));
    }

    #[test]
    fn test_reset_all_except() {
        let states = StateBroadcast::new([STATE_UP, STATE_DOWN, "LOADED:rates"]);
        states.fire(STATE_UP);
        states.fire("LOADED:rates");
        states.fire(STATE_DOWN);

        states.reset_all_except(STATE_DOWN);

        assert!(!states.is_fired(STATE_UP));
        assert!(!states.is_fired("LOADED:rates"));
        assert!(states.is_fired(STATE_DOWN));
        assert_eq!(states.states(), vec!["DOWN", "LOADED:rates", "UP"]);
    }
}
