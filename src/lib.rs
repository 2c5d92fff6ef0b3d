//! Short-video feed backend: cursor-paginated feeds served through a
//! stampede-safe cache-aside gateway.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
