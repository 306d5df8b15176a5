//! WebSocket infrastructure for live job status.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler that streams a job's status frames.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
