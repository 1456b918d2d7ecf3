//! BigQuery mappers

use super::{base_item, required_str, str_at, UNIQUE_ATTR};
use crate::error::MapError;
use crate::item::{composite_lookup_key, BlastPropagation, Edge, Item, QueryMethod};
use crate::location::Location;
use crate::reference::{extract_path_values, path_segments, Linker};
use serde_json::Value;

pub const DATASET: &str = "gcp-big-query-dataset";
pub const TABLE: &str = "gcp-big-query-table";
pub const CONNECTION: &str = "gcp-big-query-connection";
const CRYPTO_KEY: &str = "gcp-cloud-kms-crypto-key";
const SERVICE_ACCOUNT: &str = "gcp-iam-service-account";

/// Fields of a connection that name the service account it acts as
const CONNECTION_ACCOUNT_FIELDS: &[&str] = &[
    "cloudResource.serviceAccountId",
    "cloudSql.serviceAccountId",
    "spark.serviceAccountId",
];

pub fn map_dataset(body: &Value, location: &Location, linker: &Linker) -> Result<Item, MapError> {
    let dataset_id = required_str(DATASET, body, "datasetReference.datasetId")?.to_string();
    let mut item = base_item(DATASET, "datasetId", body, location)?;
    item.attributes
        .insert("datasetId".to_string(), Value::String(dataset_id.clone()));

    item.edges.push(Edge {
        target_type: TABLE.to_string(),
        method: QueryMethod::Search,
        query: dataset_id,
        target_scope: location.scope(),
        propagation: BlastPropagation::OUTBOUND,
    });

    if let Some(key) = str_at(body, "defaultEncryptionConfiguration.kmsKeyName") {
        item.edges
            .extend(linker.link(location, CRYPTO_KEY, key, BlastPropagation::INBOUND));
    }

    Ok(item)
}

pub fn map_table(body: &Value, location: &Location, linker: &Linker) -> Result<Item, MapError> {
    let dataset_id = required_str(TABLE, body, "tableReference.datasetId")?;
    let table_id = required_str(TABLE, body, "tableReference.tableId")?;
    let mut item = base_item(TABLE, UNIQUE_ATTR, body, location)?;
    item.attributes.insert(
        UNIQUE_ATTR.to_string(),
        Value::String(composite_lookup_key(&[dataset_id, table_id])),
    );

    let dataset_ref = match str_at(body, "tableReference.projectId") {
        Some(project) => format!("{}:{}", project, dataset_id),
        None => dataset_id.to_string(),
    };
    item.edges
        .extend(linker.link(location, DATASET, &dataset_ref, BlastPropagation::INBOUND));

    if let Some(connection) = str_at(body, "externalDataConfiguration.connectionId") {
        item.edges
            .extend(linker.link(location, CONNECTION, connection, BlastPropagation::INBOUND));
    }
    if let Some(key) = str_at(body, "encryptionConfiguration.kmsKeyName") {
        item.edges
            .extend(linker.link(location, CRYPTO_KEY, key, BlastPropagation::INBOUND));
    }

    Ok(item)
}

pub fn map_connection(
    body: &Value,
    location: &Location,
    linker: &Linker,
) -> Result<Item, MapError> {
    let name = required_str(CONNECTION, body, "name")?;
    let parts = extract_path_values(&path_segments(name), &["locations", "connections"])
        .ok_or(MapError::MissingField {
            item_type: CONNECTION.to_string(),
            field: "name",
        })?;

    let mut item = base_item(CONNECTION, UNIQUE_ATTR, body, location)?;
    item.attributes.insert(
        UNIQUE_ATTR.to_string(),
        Value::String(composite_lookup_key(&parts)),
    );

    for field in CONNECTION_ACCOUNT_FIELDS {
        if let Some(account) = str_at(body, field) {
            item.edges
                .extend(linker.link(location, SERVICE_ACCOUNT, account, BlastPropagation::INBOUND));
        }
    }

    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project() -> Location {
        Location::project("proj")
    }

    #[test]
    fn test_dataset() {
        let body = json!({
            "id": "proj:sales",
            "datasetReference": {"projectId": "proj", "datasetId": "sales"},
            "defaultEncryptionConfiguration": {
                "kmsKeyName": "projects/proj/locations/us/keyRings/bq/cryptoKeys/datasets"
            }
        });
        let item = map_dataset(&body, &project(), &Linker::builtin()).unwrap();
        assert_eq!(item.unique_attribute_value().as_deref(), Some("sales"));

        let tables = item.edges.iter().find(|e| e.target_type == TABLE).unwrap();
        assert_eq!(tables.method, QueryMethod::Search);
        assert_eq!(tables.query, "sales");

        let key = item.edges.iter().find(|e| e.target_type == CRYPTO_KEY).unwrap();
        assert_eq!(key.query, "us|bq|datasets");
    }

    #[test]
    fn test_table_unique_attribute_is_composite() {
        let body = json!({
            "tableReference": {"projectId": "proj", "datasetId": "sales", "tableId": "orders"},
            "externalDataConfiguration": {"connectionId": "proj.us.lake"}
        });
        let item = map_table(&body, &project(), &Linker::builtin()).unwrap();
        assert_eq!(item.unique_attribute, UNIQUE_ATTR);
        assert_eq!(item.unique_attribute_value().as_deref(), Some("sales|orders"));

        let dataset = item.edges.iter().find(|e| e.target_type == DATASET).unwrap();
        assert_eq!(dataset.query, "sales");
        assert_eq!(dataset.target_scope, "proj");

        let connection = item.edges.iter().find(|e| e.target_type == CONNECTION).unwrap();
        assert_eq!(connection.query, "us|lake");
        assert_eq!(connection.target_scope, "proj");
        assert_eq!(connection.propagation, BlastPropagation::INBOUND);
    }

    #[test]
    fn test_table_connection_in_full_path_form() {
        let body = json!({
            "tableReference": {"datasetId": "sales", "tableId": "orders"},
            "externalDataConfiguration": {
                "connectionId": "projects/other/locations/eu/connections/lake"
            }
        });
        let item = map_table(&body, &project(), &Linker::builtin()).unwrap();
        let connection = item.edges.iter().find(|e| e.target_type == CONNECTION).unwrap();
        assert_eq!(connection.query, "eu|lake");
        assert_eq!(connection.target_scope, "other");
    }

    #[test]
    fn test_table_requires_reference() {
        let body = json!({"tableReference": {"datasetId": "sales"}});
        let err = map_table(&body, &project(), &Linker::builtin()).unwrap_err();
        assert!(matches!(err, MapError::MissingField { field: "tableReference.tableId", .. }));
    }

    #[test]
    fn test_connection() {
        let body = json!({
            "name": "projects/123456/locations/us/connections/lake",
            "cloudResource": {"serviceAccountId": "bqcx-123456@gcp-sa-bigquery-condel.iam.gserviceaccount.com"}
        });
        let item = map_connection(&body, &project(), &Linker::builtin()).unwrap();
        assert_eq!(item.unique_attribute_value().as_deref(), Some("us|lake"));
        assert_eq!(item.edges.len(), 1);
        assert_eq!(item.edges[0].target_type, SERVICE_ACCOUNT);
    }

    #[test]
    fn test_connection_with_malformed_name() {
        let body = json!({"name": "lake"});
        assert!(map_connection(&body, &project(), &Linker::builtin()).is_err());
    }
}
