//! Periodic idle-session sweep

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SessionRegistry;

/// Running sweep task and the token that stops it
pub(super) struct SweepHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub(super) fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Start sweeping every `interval`
///
/// Holds only a weak reference, so the task ends once the registry is
/// dropped.
pub(super) fn spawn(registry: Weak<SessionRegistry>, interval: Duration) -> SweepHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(registry) = registry.upgrade() else { break };
                    let ended = registry.sweep_idle().await;
                    if !ended.is_empty() {
                        log::info!("Idle sweep ended {} session(s)", ended.len());
                    }
                }
            }
        }
        log::debug!("Idle sweep stopped");
    });

    SweepHandle { cancel, task }
}
