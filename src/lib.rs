//! Blog content backend: Markdown articles served over HTTP through a
//! Redis-backed read-through cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod content;
pub mod domain;
pub mod infra;
