//! SQL generation module.
//!
//! - [`token`] - Token types for SQL generation, including bound parameters
//! - [`dialect`] - The dialect capability contract and backend implementations

pub mod dialect;
pub mod token;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect, TruncOptions};
pub use token::{Token, TokenStream};
