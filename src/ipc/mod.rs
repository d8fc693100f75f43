//! Line-delimited JSON-RPC command surface over stdio

pub mod protocol;
pub mod server;

pub use server::{dispatch, serve, serve_stdio};
