//! Resource Registry - Load resource definitions from JSON
//!
//! Endpoint templates and metadata for every resource type live in embedded
//! JSON files. Each type is paired with a mapper function when the registry
//! is built; nothing registers itself globally.

use super::mappers::{self, MapFn};
use crate::error::RegistryError;
use crate::location::ScopeKind;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/common.json"),
    include_str!("../resources/compute.json"),
    include_str!("../resources/bigquery.json"),
    include_str!("../resources/kms.json"),
];

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub category: String,
    /// Key into the service root table
    pub service: String,
    pub scope: ScopeKind,
    /// Attribute holding the value a GET is made with
    pub unique_attribute: String,
    /// Names of the GET query components, in order
    pub get_query: Vec<String>,
    pub get: String,
    #[serde(default)]
    pub list: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    /// Names of the SEARCH query components, in order
    #[serde(default)]
    pub search_query: Vec<String>,
    #[serde(default)]
    pub aggregated_list: Option<String>,
    /// Response field holding the resource array of list/search pages
    pub items_field: String,
    /// Per-scope field of aggregated responses; defaults to `items_field`
    #[serde(default)]
    pub aggregated_field: Option<String>,
    #[serde(default)]
    pub iam_permissions: Vec<String>,
    #[serde(default)]
    pub potential_links: Vec<String>,
}

impl ResourceDef {
    pub fn supports_wildcard(&self) -> bool {
        self.aggregated_list.is_some()
    }

    pub fn aggregated_field(&self) -> &str {
        self.aggregated_field.as_deref().unwrap_or(&self.items_field)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceConfig {
    /// Service name -> API root URL
    #[serde(default)]
    pub services: HashMap<String, String>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// A registered resource type: its definition and its mapper
pub struct ResourceType {
    pub item_type: String,
    pub def: ResourceDef,
    pub mapper: MapFn,
}

impl std::fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceType")
            .field("item_type", &self.item_type)
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

/// All resource types known to the process
#[derive(Debug, Default)]
pub struct Registry {
    services: HashMap<String, String>,
    types: BTreeMap<String, Arc<ResourceType>>,
}

impl Registry {
    /// Registry of the built-in types from the embedded definitions
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_definitions(RESOURCE_FILES, &mappers::builtin())
    }

    /// Build a registry from JSON definition files and a mapper table.
    /// Every defined type must have a mapper and a known service.
    pub fn from_definitions(
        contents: &[&str],
        mappers: &[(&str, MapFn)],
    ) -> Result<Self, RegistryError> {
        let mut merged = ResourceConfig::default();
        for content in contents {
            let partial: ResourceConfig = serde_json::from_str(content)?;
            merged.services.extend(partial.services);
            merged.resources.extend(partial.resources);
        }

        let mapper_table: HashMap<&str, MapFn> = mappers.iter().copied().collect();
        let mut types = BTreeMap::new();
        for (item_type, def) in merged.resources {
            if !merged.services.contains_key(&def.service) {
                return Err(RegistryError::UnknownService {
                    item_type,
                    service: def.service,
                });
            }
            let Some(mapper) = mapper_table.get(item_type.as_str()).copied() else {
                return Err(RegistryError::MissingMapper(item_type));
            };

            tracing::debug!("Registered resource type {}", item_type);
            types.insert(
                item_type.clone(),
                Arc::new(ResourceType {
                    item_type,
                    def,
                    mapper,
                }),
            );
        }

        Ok(Self {
            services: merged.services,
            types,
        })
    }

    /// Get a resource type by key
    pub fn get(&self, item_type: &str) -> Option<&Arc<ResourceType>> {
        self.types.get(item_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceType>> {
        self.types.values()
    }

    /// Get all resource type keys, sorted
    pub fn item_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Service name -> API root URL
    pub fn services(&self) -> &HashMap<String, String> {
        &self.services
    }

    /// Union of the IAM permissions every registered type needs
    pub fn required_permissions(&self) -> BTreeSet<String> {
        self.types
            .values()
            .flat_map(|t| t.def.iam_permissions.iter().cloned())
            .collect()
    }
}
