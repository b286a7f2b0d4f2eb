//! Hand-off to the reservation view once admitted.

use tokio::sync::mpsc;
use tracing::warn;

/// Route of the reservation view for a resource.
pub fn reservation_route(resource_id: &str) -> String {
    format!("/concerts/{}/reserve", resource_id)
}

/// Moves the user to another view.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that forwards routes over a channel to whoever drives the UI.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, route: &str) {
        if self.tx.send(route.to_string()).is_err() {
            warn!(route = route, "Navigation dropped, no receiver");
        }
    }
}
