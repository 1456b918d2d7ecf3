//! Health classification
//!
//! Each resource family reports its own status enumeration. The tables here
//! fold those values onto [`Health`]; anything not listed is `Unknown`.

use crate::item::Health;

/// Status value -> health, for one resource family
pub type StatusTable = &'static [(&'static str, Health)];

/// Compute Engine instance `status`
pub const COMPUTE_INSTANCE_STATUS: StatusTable = &[
    ("PROVISIONING", Health::Pending),
    ("STAGING", Health::Pending),
    ("RUNNING", Health::Ok),
    ("STOPPING", Health::Pending),
    ("SUSPENDING", Health::Pending),
    ("SUSPENDED", Health::Ok),
    ("REPAIRING", Health::Warning),
    ("TERMINATED", Health::Ok),
];

/// Compute Engine disk `status`
pub const COMPUTE_DISK_STATUS: StatusTable = &[
    ("CREATING", Health::Pending),
    ("RESTORING", Health::Pending),
    ("READY", Health::Ok),
    ("FAILED", Health::Error),
    ("DELETING", Health::Pending),
    ("UNAVAILABLE", Health::Warning),
];

/// Compute Engine subnetwork `state`
pub const COMPUTE_SUBNETWORK_STATE: StatusTable = &[
    ("READY", Health::Ok),
    ("DRAINING", Health::Warning),
];

/// Cloud KMS crypto key version `state`
pub const KMS_KEY_VERSION_STATE: StatusTable = &[
    ("PENDING_GENERATION", Health::Pending),
    ("PENDING_IMPORT", Health::Pending),
    ("PENDING_EXTERNAL_DESTRUCTION", Health::Pending),
    ("ENABLED", Health::Ok),
    ("DISABLED", Health::Warning),
    ("DESTROY_SCHEDULED", Health::Warning),
    ("DESTROYED", Health::Error),
    ("IMPORT_FAILED", Health::Error),
    ("GENERATION_FAILED", Health::Error),
    ("EXTERNAL_DESTRUCTION_FAILED", Health::Error),
];

/// Look a status up in a table
pub fn classify(table: StatusTable, status: &str) -> Health {
    table
        .iter()
        .find(|(value, _)| *value == status)
        .map(|(_, health)| *health)
        .unwrap_or(Health::Unknown)
}

/// Classify an optional status field; a missing field is `None`, not `Unknown`
pub fn classify_opt(table: StatusTable, status: Option<&str>) -> Option<Health> {
    status.map(|s| classify(table, s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_statuses() {
        assert_eq!(classify(COMPUTE_INSTANCE_STATUS, "RUNNING"), Health::Ok);
        assert_eq!(classify(COMPUTE_INSTANCE_STATUS, "STAGING"), Health::Pending);
        assert_eq!(classify(COMPUTE_DISK_STATUS, "FAILED"), Health::Error);
        assert_eq!(classify(KMS_KEY_VERSION_STATE, "DISABLED"), Health::Warning);
    }

    #[test]
    fn test_unknown_status_is_unknown() {
        assert_eq!(classify(COMPUTE_INSTANCE_STATUS, "SOMETHING_NEW"), Health::Unknown);
        assert_eq!(classify(COMPUTE_DISK_STATUS, ""), Health::Unknown);
        // case matters
        assert_eq!(classify(COMPUTE_DISK_STATUS, "ready"), Health::Unknown);
    }

    #[test]
    fn test_missing_status_field() {
        assert_eq!(classify_opt(COMPUTE_DISK_STATUS, None), None);
        assert_eq!(classify_opt(COMPUTE_DISK_STATUS, Some("READY")), Some(Health::Ok));
    }

    #[test]
    fn test_tables_have_no_duplicate_values() {
        for table in [
            COMPUTE_INSTANCE_STATUS,
            COMPUTE_DISK_STATUS,
            COMPUTE_SUBNETWORK_STATE,
            KMS_KEY_VERSION_STATE,
        ] {
            let mut values: Vec<_> = table.iter().map(|(v, _)| *v).collect();
            values.sort_unstable();
            let before = values.len();
            values.dedup();
            assert_eq!(before, values.len());
        }
    }
}
