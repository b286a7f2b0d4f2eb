//! Push channel abstraction.
//!
//! A `PushChannel` opens a per-resource connection over which the backend
//! may announce admission. Frames are JSON text decoded into `PushMessage`.

mod types;
mod websocket;

pub use types::*;
pub use websocket::WsPushChannel;
