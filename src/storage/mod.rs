//! Storage and persistence layer
//!
//! - File system operations (one JSON file per account index)
//! - Key management
//! - Data models

mod file_system;
mod keys;
mod models;

pub use file_system::Storage;
pub use keys::KeyManager;
pub use models::Metadata;
