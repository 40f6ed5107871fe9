//! Connectivity Monitor: current online/offline state plus transition events.
//!
//! The host feeds it the platform's reachability signal via `set_online`. It
//! does not probe the remote store; "online but unreachable" only shows up as
//! a failed fetch or write.

use tokio::sync::watch;
use tracing::info;

/// A change in reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    BecameOnline,
    BecameOffline,
}

impl ConnectivityEvent {
    fn from_state(online: bool) -> Self {
        if online {
            ConnectivityEvent::BecameOnline
        } else {
            ConnectivityEvent::BecameOffline
        }
    }
}

pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record the platform's current reachability. Returns the transition
    /// event if the state actually changed; repeated reports are ignored.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }
        let event = ConnectivityEvent::from_state(online);
        info!(?event, "connectivity changed");
        Some(event)
    }

    /// Stream of transition events from this point on.
    pub fn subscribe(&self) -> ConnectivityWatcher {
        ConnectivityWatcher {
            rx: self.state.subscribe(),
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Receiving side of the monitor.
///
/// Transitions that happen faster than the watcher is polled are coalesced:
/// the watcher wakes once and reports the state current at that moment.
pub struct ConnectivityWatcher {
    rx: watch::Receiver<bool>,
}

impl ConnectivityWatcher {
    /// Wait for the next transition. `None` once the monitor is dropped.
    pub async fn next_event(&mut self) -> Option<ConnectivityEvent> {
        self.rx.changed().await.ok()?;
        let online = *self.rx.borrow_and_update();
        Some(ConnectivityEvent::from_state(online))
    }
}
