//! Mappers from raw API bodies to items
//!
//! One function per resource type. Mappers never panic on malformed input:
//! a body that cannot produce an item yields a [`MapError`], and a reference
//! that cannot be resolved is dropped from the edge list.

mod bigquery;
mod compute;
mod kms;

use crate::error::MapError;
use crate::item::{Attributes, Item};
use crate::location::Location;
use crate::reference::Linker;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute holding the composite unique value of multi-part types
pub const UNIQUE_ATTR: &str = "uniqueAttr";

/// Maps one API body observed at a location into an item
pub type MapFn = fn(&Value, &Location, &Linker) -> Result<Item, MapError>;

/// Mapper table for every built-in type
pub fn builtin() -> Vec<(&'static str, MapFn)> {
    vec![
        (compute::INSTANCE, compute::map_instance as MapFn),
        (compute::DISK, compute::map_disk),
        (compute::NETWORK, compute::map_network),
        (compute::SUBNETWORK, compute::map_subnetwork),
        (bigquery::DATASET, bigquery::map_dataset),
        (bigquery::TABLE, bigquery::map_table),
        (bigquery::CONNECTION, bigquery::map_connection),
        (kms::KEY_RING, kms::map_key_ring),
        (kms::CRYPTO_KEY, kms::map_crypto_key),
    ]
}

/// Look up a value using a dot-notation path; numeric parts index arrays
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) => current.get(idx)?,
            Err(_) => current.get(part)?,
        };
    }
    Some(current)
}

/// Non-empty string at `path`
pub fn str_at<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    json_path(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Non-empty strings at `field` of every element of the array at `path`
fn strs_in<'a>(value: &'a Value, path: &str, field: Option<&str>) -> Vec<&'a str> {
    let Some(Value::Array(elements)) = json_path(value, path) else {
        return Vec::new();
    };
    elements
        .iter()
        .filter_map(|element| match field {
            Some(field) => str_at(element, field),
            None => element.as_str().filter(|s| !s.is_empty()),
        })
        .collect()
}

fn required_str<'a>(
    item_type: &str,
    value: &'a Value,
    field: &'static str,
) -> Result<&'a str, MapError> {
    str_at(value, field).ok_or_else(|| MapError::MissingField {
        item_type: item_type.to_string(),
        field,
    })
}

/// Item with every top-level body field as an attribute and labels as tags
fn base_item(
    item_type: &str,
    unique_attribute: &str,
    body: &Value,
    location: &Location,
) -> Result<Item, MapError> {
    let Value::Object(fields) = body else {
        return Err(MapError::NotAnObject {
            item_type: item_type.to_string(),
        });
    };

    let mut attributes = Attributes::new();
    let mut tags = BTreeMap::new();
    for (key, value) in fields {
        if key == "labels" {
            if let Value::Object(labels) = value {
                for (label, label_value) in labels {
                    if let Some(s) = label_value.as_str() {
                        tags.insert(label.clone(), s.to_string());
                    }
                }
            }
            continue;
        }
        attributes.insert(key.clone(), value.clone());
    }

    Ok(Item {
        item_type: item_type.to_string(),
        unique_attribute: unique_attribute.to_string(),
        attributes,
        scope: location.scope(),
        tags,
        health: None,
        edges: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_path() {
        let value = json!({"a": {"b": [{"c": "x"}]}});
        assert_eq!(str_at(&value, "a.b.0.c"), Some("x"));
        assert_eq!(str_at(&value, "a.b.1.c"), None);
        assert_eq!(str_at(&value, "a.missing"), None);
    }

    #[test]
    fn test_strs_in() {
        let value = json!({"disks": [{"source": "a"}, {"source": ""}, {"other": 1}, {"source": "b"}]});
        assert_eq!(strs_in(&value, "disks", Some("source")), vec!["a", "b"]);

        let value = json!({"users": ["u1", 7, "u2"]});
        assert_eq!(strs_in(&value, "users", None), vec!["u1", "u2"]);
        assert!(strs_in(&value, "missing", None).is_empty());
    }

    #[test]
    fn test_base_item_moves_labels_to_tags() {
        let body = json!({"name": "vm-1", "labels": {"env": "prod", "n": 1}});
        let item = base_item("t", "name", &body, &Location::project("p")).unwrap();
        assert_eq!(item.tags.get("env").map(String::as_str), Some("prod"));
        assert!(!item.tags.contains_key("n"));
        assert!(!item.attributes.contains_key("labels"));
        assert_eq!(item.scope, "p");
    }

    #[test]
    fn test_base_item_rejects_non_objects() {
        let err = base_item("t", "name", &json!([1, 2]), &Location::project("p")).unwrap_err();
        assert!(matches!(err, MapError::NotAnObject { .. }));
    }

    #[test]
    fn test_every_builtin_mapper_rejects_garbage() {
        let linker = Linker::builtin();
        let location = Location::zonal("p", "us-central1-a");
        for (item_type, mapper) in builtin() {
            assert!(mapper(&json!("nope"), &location, &linker).is_err(), "{}", item_type);
            assert!(mapper(&json!({}), &location, &linker).is_err(), "{}", item_type);
        }
    }
}
