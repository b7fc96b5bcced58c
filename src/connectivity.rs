use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Network reachability signal for the transcription pipeline
///
/// The platform reachability callback (surfaced over HTTP in this daemon)
/// pushes state changes in through `set_online`; consumers either sample
/// `is_online` at decision points or `subscribe` to react to transitions.
/// Nothing polls.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            sender: Arc::new(watch::channel(initially_online).0),
        }
    }

    /// Inject a reachability change
    pub fn set_online(&self, online: bool) {
        let previous = self.sender.send_replace(online);
        if previous != online {
            info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        // Assume online until the platform says otherwise
        Self::new(true)
    }
}
