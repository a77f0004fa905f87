//! Offline cache agent for the book club site.
//!
//! The agent answers three lifecycle events: `install` precaches the core
//! assets, `activate` drops caches from older versions and claims open pages,
//! and `fetch` serves GET requests cache-first with a network fallback.

pub mod agent;
pub mod cache;
pub mod config;
pub mod event;
pub mod host;
pub mod http;
pub mod logging;
pub mod network;
