//! Configuration management module
//!
//! Values are layered: built-in defaults, then the `.env` file, then
//! environment variables, then command-line arguments.

pub mod env;
pub mod parser;

// Re-export main functionality
pub use env::EnvManager;
pub use parser::{display_config_summary, load_config, ConfigParser};

// Re-export from models for convenience
pub use crate::models::Config;
