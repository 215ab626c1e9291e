//! Domain layer types and invariants.

pub mod articles;
