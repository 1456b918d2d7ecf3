//! Cloud KMS mappers

use super::{base_item, required_str, str_at, UNIQUE_ATTR};
use crate::error::MapError;
use crate::health::{classify_opt, KMS_KEY_VERSION_STATE};
use crate::item::{composite_lookup_key, BlastPropagation, Edge, Item, QueryMethod};
use crate::location::Location;
use crate::reference::{extract_path_values, path_segments, Linker};
use serde_json::Value;

pub const KEY_RING: &str = "gcp-cloud-kms-key-ring";
pub const CRYPTO_KEY: &str = "gcp-cloud-kms-crypto-key";

/// Components of `name` following `labels`, or a missing-name error
fn name_parts(item_type: &str, body: &Value, labels: &[&str]) -> Result<Vec<String>, MapError> {
    let name = required_str(item_type, body, "name")?;
    extract_path_values(&path_segments(name), labels).ok_or(MapError::MissingField {
        item_type: item_type.to_string(),
        field: "name",
    })
}

pub fn map_key_ring(body: &Value, location: &Location, _linker: &Linker) -> Result<Item, MapError> {
    let parts = name_parts(KEY_RING, body, &["locations", "keyRings"])?;
    let unique = composite_lookup_key(&parts);

    let mut item = base_item(KEY_RING, UNIQUE_ATTR, body, location)?;
    item.attributes
        .insert(UNIQUE_ATTR.to_string(), Value::String(unique.clone()));

    // Keys in the ring are found by searching with the ring's location and name
    item.edges.push(Edge {
        target_type: CRYPTO_KEY.to_string(),
        method: QueryMethod::Search,
        query: unique,
        target_scope: location.scope(),
        propagation: BlastPropagation::OUTBOUND,
    });

    Ok(item)
}

pub fn map_crypto_key(
    body: &Value,
    location: &Location,
    linker: &Linker,
) -> Result<Item, MapError> {
    let parts = name_parts(CRYPTO_KEY, body, &["locations", "keyRings", "cryptoKeys"])?;

    let mut item = base_item(CRYPTO_KEY, UNIQUE_ATTR, body, location)?;
    item.attributes.insert(
        UNIQUE_ATTR.to_string(),
        Value::String(composite_lookup_key(&parts)),
    );
    item.health = classify_opt(KMS_KEY_VERSION_STATE, str_at(body, "primary.state"));

    if let Some(name) = str_at(body, "name") {
        item.edges
            .extend(linker.link(location, KEY_RING, name, BlastPropagation::INBOUND));
    }

    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Health;
    use serde_json::json;

    #[test]
    fn test_key_ring() {
        let body = json!({"name": "projects/proj/locations/global/keyRings/ring"});
        let item = map_key_ring(&body, &Location::project("proj"), &Linker::builtin()).unwrap();
        assert_eq!(item.unique_attribute_value().as_deref(), Some("global|ring"));
        assert_eq!(item.edges.len(), 1);
        assert_eq!(item.edges[0].method, QueryMethod::Search);
        assert_eq!(item.edges[0].query, "global|ring");
    }

    #[test]
    fn test_crypto_key() {
        let body = json!({
            "name": "projects/proj/locations/us/keyRings/ring/cryptoKeys/key",
            "primary": {"state": "DESTROY_SCHEDULED"},
            "labels": {"owner": "sec"}
        });
        let item = map_crypto_key(&body, &Location::project("proj"), &Linker::builtin()).unwrap();
        assert_eq!(item.unique_attribute_value().as_deref(), Some("us|ring|key"));
        assert_eq!(item.health, Some(Health::Warning));
        assert_eq!(item.tags.get("owner").map(String::as_str), Some("sec"));

        let ring = item.edges.iter().find(|e| e.target_type == KEY_RING).unwrap();
        assert_eq!(ring.query, "us|ring");
        assert_eq!(ring.propagation, BlastPropagation::INBOUND);
    }

    #[test]
    fn test_crypto_key_without_primary_has_no_health() {
        let body = json!({"name": "projects/proj/locations/us/keyRings/ring/cryptoKeys/key"});
        let item = map_crypto_key(&body, &Location::project("proj"), &Linker::builtin()).unwrap();
        assert_eq!(item.health, None);
    }
}
