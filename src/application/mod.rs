//! Application services layer.

pub mod blog;
pub mod error;
