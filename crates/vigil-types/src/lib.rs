//! Shared types and error hierarchy for Vigil.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod util;

pub use error::{ApiError, ConfigError, ToolError};
pub use message::*;
pub use provider::ChatProvider;
pub use tool::*;
pub use util::{preview, tail_chars, truncate_chars};
