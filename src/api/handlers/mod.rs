//! API request handlers

pub mod health;
pub mod response_handler;
