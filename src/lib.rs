//! Story Composer - Video generation studio library
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, backend payloads, errors)
//! - ports/: Trait definitions (generation backend, resource store)
//! - adapters/: Concrete implementations (HTTP backend, in-memory store, HTTP API)
//! - application/: Generic services (poller, job tracker, single video, storyboard, photo editor)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::studio::Studio;
pub use config::StudioConfig;
