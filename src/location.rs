//! Locations and scopes
//!
//! A [`Location`] is a project optionally narrowed to a region or a zone. Its
//! canonical scope string is `project`, `project.region` or `project.zone`.
//! A [`LocationSet`] holds the locations an adapter was configured with and
//! resolves caller-supplied scope strings against them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Scope marker requesting fan-out across every configured location
pub const WILDCARD_SCOPE: &str = "*";

/// Which kind of location a resource type lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Project,
    Regional,
    Zonal,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeKind::Project => "project",
            ScopeKind::Regional => "regional",
            ScopeKind::Zonal => "zonal",
        };
        f.write_str(s)
    }
}

/// A project, optionally qualified by exactly one of region or zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    project_id: String,
    region: Option<String>,
    zone: Option<String>,
}

impl Location {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            region: None,
            zone: None,
        }
    }

    pub fn regional(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            region: Some(region.into()),
            zone: None,
        }
    }

    pub fn zonal(project_id: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            region: None,
            zone: Some(zone.into()),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn kind(&self) -> ScopeKind {
        match (&self.region, &self.zone) {
            (_, Some(_)) => ScopeKind::Zonal,
            (Some(_), None) => ScopeKind::Regional,
            (None, None) => ScopeKind::Project,
        }
    }

    /// Region this location sits in; for a zone this is the zone minus its suffix
    pub fn effective_region(&self) -> Option<String> {
        if let Some(region) = &self.region {
            return Some(region.clone());
        }
        self.zone.as_deref().map(region_of_zone)
    }

    /// Canonical scope string
    pub fn scope(&self) -> String {
        match (&self.region, &self.zone) {
            (_, Some(zone)) => format!("{}.{}", self.project_id, zone),
            (Some(region), None) => format!("{}.{}", self.project_id, region),
            (None, None) => self.project_id.clone(),
        }
    }

    /// Parse a scope string by shape alone.
    ///
    /// The qualifier after the first `.` is read as a zone when it looks like
    /// `<region>-<letter>` (e.g. `us-central1-a`) and as a region otherwise.
    pub fn parse_scope(scope: &str) -> Option<Location> {
        if scope.is_empty() || scope == WILDCARD_SCOPE {
            return None;
        }

        match scope.split_once('.') {
            None => Some(Location::project(scope)),
            Some((project, qualifier)) => {
                if project.is_empty() || qualifier.is_empty() || qualifier.contains('.') {
                    return None;
                }
                if looks_like_zone(qualifier) {
                    Some(Location::zonal(project, qualifier))
                } else {
                    Some(Location::regional(project, qualifier))
                }
            },
        }
    }

    /// Parse a key from an aggregated list response
    /// (`zones/us-central1-a`, `regions/us-central1`, `global`)
    pub fn from_aggregated_key(project_id: &str, key: &str) -> Option<Location> {
        if key == "global" {
            return Some(Location::project(project_id));
        }

        let (kind, name) = key.split_once('/')?;
        if name.is_empty() || name.contains('/') {
            return None;
        }

        match kind {
            "zones" => Some(Location::zonal(project_id, name)),
            "regions" => Some(Location::regional(project_id, name)),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scope())
    }
}

/// Region a zone belongs to: `us-central1-a` -> `us-central1`
pub fn region_of_zone(zone: &str) -> String {
    match zone.rsplit_once('-') {
        Some((region, _)) => region.to_string(),
        None => zone.to_string(),
    }
}

fn looks_like_zone(name: &str) -> bool {
    let Some((region, suffix)) = name.rsplit_once('-') else {
        return false;
    };
    region.contains('-')
        && suffix.len() == 1
        && suffix.chars().all(|c| c.is_ascii_lowercase())
}

/// The set of locations an adapter serves
#[derive(Debug, Clone, Default)]
pub struct LocationSet {
    locations: Vec<Location>,
    index: HashSet<Location>,
}

impl LocationSet {
    pub fn new(locations: impl IntoIterator<Item = Location>) -> Self {
        let mut set = Self::default();
        for location in locations {
            if set.index.insert(location.clone()) {
                set.locations.push(location);
            }
        }
        set
    }

    /// Expand configured projects/regions/zones into every location of `kind`
    pub fn expand(projects: &[String], regions: &[String], zones: &[String], kind: ScopeKind) -> Self {
        let mut locations = Vec::new();
        for project in projects {
            match kind {
                ScopeKind::Project => locations.push(Location::project(project.clone())),
                ScopeKind::Regional => locations.extend(
                    regions.iter().map(|r| Location::regional(project.clone(), r.clone())),
                ),
                ScopeKind::Zonal => locations.extend(
                    zones.iter().map(|z| Location::zonal(project.clone(), z.clone())),
                ),
            }
        }
        Self::new(locations)
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    /// Membership predicate used to drop results outside the configured set
    pub fn contains(&self, location: &Location) -> bool {
        self.index.contains(location)
    }

    /// Parse a concrete scope string and match it against the configured
    /// locations. Malformed scopes and the wildcard never resolve.
    pub fn resolve(&self, scope: &str) -> Option<&Location> {
        let location = Location::parse_scope(scope)?;
        self.index.get(&location)
    }

    /// Distinct project ids, in configuration order
    pub fn projects(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.locations
            .iter()
            .filter(|l| seen.insert(l.project_id()))
            .map(|l| l.project_id().to_string())
            .collect()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.locations.iter().map(Location::scope).collect()
    }
}
