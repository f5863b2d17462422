//! Domain layer - Pure business logic.

pub mod errors;
pub mod jobs;
pub mod operation;
