/// Core Module
///
/// Error handling and the database pipeline shared by the rest of the crate.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbalError, Result};
