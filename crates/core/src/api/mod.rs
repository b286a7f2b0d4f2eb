//! Thin HTTP client for the ticketing backend.
//!
//! Wraps `reqwest` with the request/response conventions the backend
//! expects: access keys attached to seat calls, `{success, message, data}`
//! envelopes unwrapped, and expired reservation keys evicted on 403.

mod client;
mod types;

pub use client::ApiClient;
pub use types::*;
