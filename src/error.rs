//! Error types surfaced by the discovery engine

use crate::gcp::ProviderError;
use std::fmt;
use thiserror::Error;

/// Coarse classification reported to query callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoScope,
    NotFound,
    Other,
    Provider,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NoScope => "NOSCOPE",
            ErrorCode::NotFound => "NOTFOUND",
            ErrorCode::Other => "OTHER",
            ErrorCode::Provider => "PROVIDER",
        };
        f.write_str(s)
    }
}

/// Errors returned from Get/List/Search
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    #[error("scope {scope} is not served by {item_type}")]
    NoScope { item_type: String, scope: String },

    #[error("{item_type} {query} not found in {scope}")]
    NotFound {
        item_type: String,
        scope: String,
        query: String,
    },

    #[error("{0}")]
    Other(String),

    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl QueryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            QueryError::NoScope { .. } => ErrorCode::NoScope,
            QueryError::NotFound { .. } => ErrorCode::NotFound,
            QueryError::Other(_) | QueryError::Cancelled => ErrorCode::Other,
            QueryError::Provider(_) => ErrorCode::Provider,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

impl From<MapError> for QueryError {
    fn from(err: MapError) -> Self {
        QueryError::Other(err.to_string())
    }
}

/// A provider body could not be turned into an item
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("{item_type}: response body is not an object")]
    NotAnObject { item_type: String },

    #[error("{item_type}: missing required field {field}")]
    MissingField {
        item_type: String,
        field: &'static str,
    },
}

/// Embedded resource definitions could not be loaded
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to parse embedded resource definitions: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("resource type {0} has no mapper")]
    MissingMapper(String),

    #[error("resource type {item_type} references unknown service {service}")]
    UnknownService { item_type: String, service: String },
}
