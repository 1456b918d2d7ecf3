//! Discovered items and the edges between them

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered attribute map of a discovered item
pub type Attributes = serde_json::Map<String, Value>;

/// Separator joining the components of a composite lookup key
pub const COMPOSITE_SEPARATOR: char = '|';

/// Join identifier components into a single lookup key
pub fn composite_lookup_key<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(&COMPOSITE_SEPARATOR.to_string())
}

/// Split a composite lookup key back into its components
pub fn split_composite_key(key: &str) -> Vec<String> {
    key.split(COMPOSITE_SEPARATOR).map(str::to_string).collect()
}

/// How a query addresses its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryMethod {
    Get,
    List,
    Search,
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryMethod::Get => "GET",
            QueryMethod::List => "LIST",
            QueryMethod::Search => "SEARCH",
        };
        f.write_str(s)
    }
}

/// Ordinal health of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    Unknown,
    Ok,
    Pending,
    Warning,
    Error,
}

/// Directions in which a change travels along an edge.
///
/// `in_`: a change to the target can affect the source item.
/// `out`: a change to the source item can affect the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlastPropagation {
    #[serde(rename = "in")]
    pub in_: bool,
    pub out: bool,
}

impl BlastPropagation {
    pub const fn new(in_: bool, out: bool) -> Self {
        Self { in_, out }
    }

    /// Target affects source only
    pub const INBOUND: Self = Self::new(true, false);
    /// Source affects target only
    pub const OUTBOUND: Self = Self::new(false, true);
    pub const BOTH: Self = Self::new(true, true);
}

/// A directed link from an item to another item it references
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub target_type: String,
    pub method: QueryMethod,
    pub query: String,
    pub target_scope: String,
    pub propagation: BlastPropagation,
}

/// A normalized resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub item_type: String,
    /// Name of the attribute holding the item's unique value
    pub unique_attribute: String,
    pub attributes: Attributes,
    pub scope: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Item {
    /// Value of the unique attribute, as the string a GET would use
    pub fn unique_attribute_value(&self) -> Option<String> {
        match self.attributes.get(&self.unique_attribute)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Globally unique reference: `type/scope/value`
    pub fn reference(&self) -> String {
        format!(
            "{}/{}/{}",
            self.item_type,
            self.scope,
            self.unique_attribute_value().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_composite_key_round_trip() {
        let key = composite_lookup_key(&["us", "ring", "key"]);
        assert_eq!(key, "us|ring|key");
        assert_eq!(split_composite_key(&key), vec!["us", "ring", "key"]);
    }

    #[test]
    fn test_unique_attribute_value() {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("vm-1"));
        attributes.insert("id".to_string(), json!(42));
        let item = Item {
            item_type: "gcp-compute-instance".to_string(),
            unique_attribute: "name".to_string(),
            attributes,
            scope: "proj.us-central1-a".to_string(),
            tags: BTreeMap::new(),
            health: None,
            edges: vec![],
        };

        assert_eq!(item.unique_attribute_value().as_deref(), Some("vm-1"));
        assert_eq!(item.reference(), "gcp-compute-instance/proj.us-central1-a/vm-1");
    }

    #[test]
    fn test_propagation_serializes_in_field() {
        let value = serde_json::to_value(BlastPropagation::INBOUND).unwrap();
        assert_eq!(value, json!({"in": true, "out": false}));
    }
}
