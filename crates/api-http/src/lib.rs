//! HTTP API Layer
//!
//! Ingress for the signal buffer: `POST {prefix}/webhook` appends the payload
//! to the queue and answers 202 without waiting for persistence.
//! `GET /health` is a liveness probe with no dependency check.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use server::{HttpServer, HttpServerConfig, ServerHandle};
