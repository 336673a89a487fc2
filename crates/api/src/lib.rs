//! HTTP surface of the stem separation engine.
//!
//! Exposes config, state, error handling, routes and the shared router
//! builder so integration tests and the binary entrypoint use the same app.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod upload;
