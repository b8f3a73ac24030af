//! REST API client module for the Mess Manager backend.
//!
//! This module provides the `SessionClient` for talking to the API with
//! bearer-token authentication. Expired access tokens are renewed through
//! `/auth/refresh` and the failed request is replayed once.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{RequestAttempt, RequestOptions, SessionClient, RENEWAL_PATH};
pub use error::ApiError;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportError};
