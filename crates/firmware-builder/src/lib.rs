pub mod catalog;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod log_sanitize;
pub mod metadata;
pub mod permutations;
pub mod publish;
pub mod resolve;
pub mod template;
pub mod util;
pub mod workspace;

pub use error::{Error, Result};
