//! Cache entries, their encoding, and the orchestrator that serves them.

pub mod codec;
pub mod entry;
pub mod manager;
pub mod state;
