//! Shared types for the meal-planner API relay workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
