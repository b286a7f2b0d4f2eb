//! Queue status over the backend HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::api::ApiClient;
use crate::config::{QueueConfig, RESOURCE_ID_PLACEHOLDER};

use super::{QueueError, QueueStatus, QueueStatusResponse, QueueStatusService};

/// Queue Status Service backed by the HTTP API.
pub struct HttpQueueStatus {
    api: Arc<ApiClient>,
    status_path: String,
}

impl HttpQueueStatus {
    pub fn new(api: Arc<ApiClient>, config: &QueueConfig) -> Self {
        Self {
            api,
            status_path: config.status_path.clone(),
        }
    }

    /// Request path of the status endpoint for a resource.
    fn status_path(&self, resource_id: &str) -> String {
        self.status_path.replace(
            RESOURCE_ID_PLACEHOLDER,
            &urlencoding::encode(resource_id),
        )
    }
}

#[async_trait]
impl QueueStatusService for HttpQueueStatus {
    async fn check_status(&self, resource_id: &str) -> Result<QueueStatus, QueueError> {
        let path = self.status_path(resource_id);
        let response: QueueStatusResponse = self.api.get(&path).await?;
        debug!(
            resource_id = resource_id,
            status = ?response.status,
            rank = ?response.rank,
            "Queue status received"
        );
        QueueStatus::try_from(response)
    }
}
