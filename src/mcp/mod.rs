//! Model Context Protocol transport layer.

pub mod auth;
pub mod codec;
pub mod dispatcher;
pub mod handler;
pub mod http;
pub mod responder;
pub mod router;
