//! HTTP surface of the catalog
//!
//! - `server`: axum router and server
//! - `client`: reqwest client used by the CLI

mod client;
mod server;

pub use client::{CatalogClient, DEFAULT_URL};
pub use server::{CatalogServer, ErrorResponse, CREATE_FAILED_MESSAGE, LIST_FAILED_MESSAGE};
