//! Sitepress job status notifications.
//!
//! - [`StatusBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. The job store publishes one [`JobEvent`] per
//!   record mutation; status subscriptions listen and filter by job id.

pub mod bus;

pub use bus::{JobEvent, StatusBus};
