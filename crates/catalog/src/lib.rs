//! Read-only access to the metadata catalog: authentication, retry, a shared TTL
//! cache and display-ready formatting of every lookup.

pub mod adapter;
pub mod cache;
pub mod client;
pub mod credential;
pub mod error;
pub mod format;
pub mod markup;
pub mod model;
pub mod transport;

/// Payload for a catalog resource that does not exist.
pub const UNKNOWN: &str = "unknown";

pub use adapter::{CatalogLookup, CatalogRequest, MetadataAdapter, TableRef};
pub use cache::{CacheKey, TtlCache};
pub use client::CatalogClient;
pub use credential::{Credential, CredentialManager, CredentialSettings, CredentialStatus};
pub use error::CatalogError;
pub use transport::{ApiRequest, CatalogTransport, HttpCatalogTransport};
