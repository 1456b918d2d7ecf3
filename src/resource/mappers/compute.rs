//! Compute Engine mappers

use super::{base_item, required_str, str_at, strs_in};
use crate::error::MapError;
use crate::health::{
    classify_opt, COMPUTE_DISK_STATUS, COMPUTE_INSTANCE_STATUS, COMPUTE_SUBNETWORK_STATE,
};
use crate::item::{BlastPropagation, Item};
use crate::location::Location;
use crate::reference::Linker;
use serde_json::Value;

pub const INSTANCE: &str = "gcp-compute-instance";
pub const DISK: &str = "gcp-compute-disk";
pub const NETWORK: &str = "gcp-compute-network";
pub const SUBNETWORK: &str = "gcp-compute-subnetwork";
const IMAGE: &str = "gcp-compute-image";
const SERVICE_ACCOUNT: &str = "gcp-iam-service-account";
const CRYPTO_KEY: &str = "gcp-cloud-kms-crypto-key";

pub fn map_instance(body: &Value, location: &Location, linker: &Linker) -> Result<Item, MapError> {
    required_str(INSTANCE, body, "name")?;
    let mut item = base_item(INSTANCE, "name", body, location)?;
    item.health = classify_opt(COMPUTE_INSTANCE_STATUS, str_at(body, "status"));

    if let Some(Value::Array(disks)) = body.get("disks") {
        for disk in disks {
            let Some(source) = str_at(disk, "source") else {
                continue;
            };
            // Auto-delete disks go away with the instance
            let auto_delete = disk.get("autoDelete").and_then(Value::as_bool).unwrap_or(false);
            let propagation = BlastPropagation::new(true, auto_delete);
            item.edges.extend(linker.link(location, DISK, source, propagation));
        }
    }

    for network in strs_in(body, "networkInterfaces", Some("network")) {
        item.edges
            .extend(linker.link(location, NETWORK, network, BlastPropagation::INBOUND));
    }
    for subnetwork in strs_in(body, "networkInterfaces", Some("subnetwork")) {
        item.edges
            .extend(linker.link(location, SUBNETWORK, subnetwork, BlastPropagation::INBOUND));
    }
    for email in strs_in(body, "serviceAccounts", Some("email")) {
        item.edges
            .extend(linker.link(location, SERVICE_ACCOUNT, email, BlastPropagation::INBOUND));
    }

    Ok(item)
}

pub fn map_disk(body: &Value, location: &Location, linker: &Linker) -> Result<Item, MapError> {
    required_str(DISK, body, "name")?;
    let mut item = base_item(DISK, "name", body, location)?;
    item.health = classify_opt(COMPUTE_DISK_STATUS, str_at(body, "status"));

    if let Some(image) = str_at(body, "sourceImage") {
        let edge = if image.contains("/images/family/") {
            linker.search_link(location, IMAGE, image, BlastPropagation::INBOUND)
        } else {
            linker.link(location, IMAGE, image, BlastPropagation::INBOUND)
        };
        item.edges.extend(edge);
    }

    if let Some(key) = str_at(body, "diskEncryptionKey.kmsKeyName") {
        item.edges
            .extend(linker.link(location, CRYPTO_KEY, key, BlastPropagation::INBOUND));
    }

    for user in strs_in(body, "users", None) {
        item.edges
            .extend(linker.link(location, INSTANCE, user, BlastPropagation::OUTBOUND));
    }

    Ok(item)
}

pub fn map_network(body: &Value, location: &Location, linker: &Linker) -> Result<Item, MapError> {
    required_str(NETWORK, body, "name")?;
    let mut item = base_item(NETWORK, "name", body, location)?;

    for subnetwork in strs_in(body, "subnetworks", None) {
        item.edges
            .extend(linker.link(location, SUBNETWORK, subnetwork, BlastPropagation::OUTBOUND));
    }
    for peer in strs_in(body, "peerings", Some("network")) {
        item.edges
            .extend(linker.link(location, NETWORK, peer, BlastPropagation::BOTH));
    }

    Ok(item)
}

pub fn map_subnetwork(
    body: &Value,
    location: &Location,
    linker: &Linker,
) -> Result<Item, MapError> {
    required_str(SUBNETWORK, body, "name")?;
    let mut item = base_item(SUBNETWORK, "name", body, location)?;
    item.health = classify_opt(COMPUTE_SUBNETWORK_STATE, str_at(body, "state"));

    if let Some(network) = str_at(body, "network") {
        item.edges
            .extend(linker.link(location, NETWORK, network, BlastPropagation::INBOUND));
    }

    Ok(item)
}
