#![forbid(unsafe_code)]

//! Resumable MCP Streamable HTTP session core.
//!
//! A single endpoint accepts long-lived `GET` event streams and `POST`ed
//! JSON-RPC messages, correlated by a server-issued `Mcp-Session-Id`.
//! Server-originated events are buffered per session so a reconnecting
//! client can replay what it missed via `Last-Event-ID`.

pub mod config;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
