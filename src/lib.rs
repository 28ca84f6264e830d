//! cachegate: a response-caching gateway in front of an upstream JSON API.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
