//! Admin API implementation
//!
//! Provides REST endpoints for inspecting and changing the active response handlers.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::ApiServer;
