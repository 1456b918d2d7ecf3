//! GCP API interaction module
//!
//! This module provides the provider side of discovery: authentication,
//! the HTTP client, and the REST implementation of [`ProviderApi`].
//!
//! # Module Structure
//!
//! - [`api`] - The [`ProviderApi`] trait the engine calls, and its error type
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - GCP client holding credentials and per-service API roots
//! - [`http`] - HTTP utilities for REST API calls
//! - [`rest`] - [`RestProvider`], rendering endpoint templates into requests
//!
//! # Example
//!
//! ```ignore
//! use gcp_discovery::gcp::{GcpClient, RestProvider};
//!
//! async fn example(roots: std::collections::HashMap<String, String>) -> anyhow::Result<()> {
//!     let client = GcpClient::new(roots).await?;
//!     let provider = RestProvider::new(client);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod http;
pub mod rest;

pub use api::{AggregatedPage, ApiCall, Page, ProviderApi, ProviderError, ProviderResult};
pub use client::GcpClient;
pub use rest::RestProvider;
