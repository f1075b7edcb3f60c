//! Rewrite Proxy - Response Rewriting HTTP Proxy
//!
//! An HTTP forward proxy that rewrites intercepted responses.
//!
//! ## Features
//!
//! - Pluggable response handlers kept in a concurrent registry
//! - Regex body rewriting through gzip and deflate content codings
//! - Script injection into HTML `<head>` elements
//! - Handler factory driven by type name and parameters
//! - Admin API for registering and removing handlers at runtime

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod rewrite;

pub use config::Config;
pub use error::{Result, RewriteError};
pub use rewrite::{create_handler, HandlerRegistry, ResponseHandler};
