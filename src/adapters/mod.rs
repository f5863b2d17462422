//! Adapters - Concrete implementations of ports.

pub mod api;
pub mod memory;
pub mod veo;
