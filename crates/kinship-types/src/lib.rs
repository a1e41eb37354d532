//! Types shared between the Kinship server crates and Rust clients.

pub mod api;
pub mod chat;
pub mod events;
pub mod models;
pub mod sidebar;
pub mod summary;
