//! Integration tests for the resilient cache.

mod cache_behaviour;
mod consumer;
mod http_source;
mod persistence;
