//! The HTTP service: stores, chapter sources and routes.

pub mod config;
pub mod model;
pub mod novel_store;
pub mod routes;
pub mod source;
pub mod user_store;
