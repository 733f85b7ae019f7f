use super::{ComponentState, ReloadAction, ServiceManager};
use crate::error::{Result, ServiceError};
use crate::reload::ReloadEvent;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

impl ServiceManager {
    /// Consume reload events until the channel closes or
    /// [`stop_reload_loop`](Self::stop_reload_loop) is called.
    ///
    /// Each event is dispatched on its own task so a slow reload never holds
    /// up unrelated services. Requests for the same service are serialized by
    /// its lifecycle lock.
    pub async fn run_reload_loop(&self, mut receiver: mpsc::Receiver<ReloadEvent>) {
        info!("Reload dispatcher running");
        loop {
            let event = tokio::select! {
                _ = self.dispatcher_token.cancelled() => break,
                event = receiver.recv() => event,
            };

            let Some(event) = event else {
                debug!("Reload channel closed");
                break;
            };

            let manager = self.clone();
            tokio::spawn(async move {
                manager.handle_reload_event(&event).await;
            });
        }
        info!("Reload dispatcher stopped");
    }

    /// Route one event to every affected service and reload them concurrently
    pub async fn handle_reload_event(
        &self,
        event: &ReloadEvent,
    ) -> Vec<(String, Result<ReloadAction>)> {
        let targets = self.router.targets(event.section());
        if targets.is_empty() {
            debug!("Section {} changed, nothing to reload", event.section());
            return Vec::new();
        }

        info!(
            "Section {} changed, reloading: {}",
            event.section(),
            targets.join(", ")
        );

        let reloads = targets.iter().map(|name| async move {
            let result = self.reload_service(name).await;
            if let Err(e) = &result {
                warn!("Reload of {} failed: {}", name, e);
            }
            (name.clone(), result)
        });
        join_all(reloads).await
    }

    /// Bring one service in line with the live configuration.
    ///
    /// Running and still wanted: reload. Wanted but stopped: start. Running
    /// but no longer wanted: shut down.
    pub async fn reload_service(&self, name: &str) -> Result<ReloadAction> {
        let service = self.lookup_service(name)?;
        let lock = self.service_lock(name);
        let _guard = lock.lock().await;
        let token = self.cancellation_token();

        match (service.should_run(), service.is_running()) {
            (true, true) => {
                self.set_component_state(name, ComponentState::Reloading);
                info!("Reloading {} service", name);
                match service.reload(&token).await {
                    Ok(()) => {
                        self.set_component_state(name, ComponentState::Running);
                        Ok(ReloadAction::Reloaded)
                    }
                    Err(e) => {
                        let state = if service.is_running() {
                            ComponentState::Running
                        } else {
                            ComponentState::Failed
                        };
                        self.set_component_state(name, state);
                        Err(e)
                    }
                }
            }
            (true, false) => match self.start_one(&service, &token).await {
                Ok(()) | Err(ServiceError::AlreadyRunning { .. }) => Ok(ReloadAction::Started),
                Err(e) => Err(e),
            },
            (false, true) => {
                self.stop_one(&service).await?;
                Ok(ReloadAction::Stopped)
            }
            (false, false) => Ok(ReloadAction::Unchanged),
        }
    }
}
