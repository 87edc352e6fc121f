//! Async HTTP client for the complaint API.
//!
//! Covers complaint records, single-shot attachments, chunked upload
//! sessions and the per-session progress stream.

pub mod client;
pub mod subscription;

#[cfg(test)]
mod mock_server;

pub use client::{Client, DEFAULT_BASE_URL, Error};
pub use subscription::{ProgressHandlers, ProgressSubscription};
