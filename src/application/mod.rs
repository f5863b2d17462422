//! Application layer - Generic services that use ports.

pub mod events;
pub mod outputs;
pub mod photo;
pub mod poller;
pub mod single;
pub mod storyboard;
pub mod studio;
pub mod tracker;
