//! JSON-RPC over HTTP.

pub mod protocol;
pub mod routes;
pub mod server;

pub use routes::routes;
pub use server::{ServerConfig, serve};
