//! Domain types shared by every sitepress crate.
//!
//! Kept free of any async runtime so the worker, pipeline and API crates can
//! all depend on it without pulling in each other.

pub mod error;
pub mod job;
pub mod project;
pub mod types;
