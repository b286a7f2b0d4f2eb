//! Queue status abstraction.
//!
//! This module provides a `QueueStatusService` trait for asking the backend
//! where a session stands in a resource's waiting queue.

mod http;
mod types;

pub use http::HttpQueueStatus;
pub use types::*;
