//! Transport layer for the remote server.
//!
//! Currently provides JSON-RPC over HTTP via axum.

pub mod http;

pub use http::{ServerConfig, serve};
