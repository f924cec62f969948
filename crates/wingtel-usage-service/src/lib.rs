//! Wingtel usage HTTP API service.
//!
//! This crate exposes the usage rollup over HTTP:
//!
//! - Raw data and voice record writes, each adjusting the rollup atomically
//! - Price limit and usage metrics queries over the rollup
//! - Admin rebuild and audit of the rollup
//!
//! # Authentication
//!
//! Raw writes need the service API key (`X-API-Key`); rebuild and audit need
//! the admin key (`X-Admin-Key`). Queries are public.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Store calls are synchronous

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
