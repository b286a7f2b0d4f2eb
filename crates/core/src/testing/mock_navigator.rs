//! Recording navigator for testing.

use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::navigator::Navigator;

/// A recorded navigation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedNavigation {
    pub route: String,
    pub timestamp: Instant,
}

/// Navigator that only records where it was asked to go.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    navigations: Arc<Mutex<Vec<RecordedNavigation>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigations(&self) -> Vec<RecordedNavigation> {
        self.navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn routes(&self) -> Vec<String> {
        self.navigations().into_iter().map(|n| n.route).collect()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedNavigation {
                route: route.to_string(),
                timestamp: Instant::now(),
            });
    }
}
