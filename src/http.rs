//! HTTP helpers for fetching JSON resources through the cache.

pub mod client;
