//! Build job orchestration.
//!
//! - [`store::JobStore`]: the concurrent job table and its state machine.
//! - [`dispatcher::Dispatcher`]: the fixed-size worker pool running the
//!   render, stylesheet and archive stages.
//! - [`reaper`]: the lazily started expiry task.
//! - [`subscription::JobSubscription`]: the per-observer status stream.
//! - [`queue::BuildQueue`]: the façade tying them together.

pub mod config;
pub mod dispatcher;
pub mod queue;
pub mod reaper;
pub mod store;
pub mod subscription;

pub use config::BuildConfig;
pub use queue::BuildQueue;
pub use store::JobStore;
pub use subscription::{Frame, JobSubscription};
