//! Shared error definitions and small utilities used across all switchboard crates.

pub mod error;
pub mod time;

pub use error::{Error, FromMessage, Result};
