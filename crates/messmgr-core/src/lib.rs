//! Core library for the Mess Manager client.
//!
//! Owns the session with the Mess Manager API: credentials and their
//! persistence, transparent access-token renewal, and typed wrappers for
//! meal logging, balances, community and admin routes.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiError, SessionClient};
pub use config::Config;
