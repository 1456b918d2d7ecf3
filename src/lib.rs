//! gcp-discovery - GCP resource discovery and linking
//!
//! Queries GCP resources by type, scope and identifier, normalizes them into
//! [`item::Item`]s and links each item to the resources it references, with
//! a blast-propagation direction on every edge.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gcp;
pub mod health;
pub mod item;
pub mod location;
pub mod reference;
pub mod resource;
pub mod testing;

pub use cache::{Cache, CacheKey, MemoryCache};
pub use config::Config;
pub use discovery::Discovery;
pub use error::{ErrorCode, QueryError};
pub use item::{BlastPropagation, Edge, Health, Item, QueryMethod};
pub use location::{Location, LocationSet, ScopeKind, WILDCARD_SCOPE};
pub use resource::{EngineSettings, ItemStream, QueryContext, QueryResults, Registry, ResourceAdapter};

/// Version injected at compile time via GCP_DISCOVERY_VERSION env var,
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("GCP_DISCOVERY_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
