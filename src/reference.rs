//! Reference resolution
//!
//! Resource bodies point at other resources in several encodings: full API
//! URLs, path-relative names (`projects/p/locations/l/keyRings/r`),
//! family-specific composite ids (`project:dataset.table`,
//! `project.location;connection`) and bare names. A [`Linker`] holds one
//! [`LinkRule`] per target type and turns such strings into [`Edge`]s.
//!
//! Resolution runs in order:
//!
//! 1. structured extraction of the values that follow the rule's path labels,
//! 2. the rule's delimiter formats, first full decomposition wins,
//! 3. a bare identifier, for single-component targets.
//!
//! An explicit project/region/zone in the string overrides the source item's
//! scope. Anything that does not resolve yields no edge.

use crate::item::{composite_lookup_key, BlastPropagation, Edge, QueryMethod};
use crate::location::{Location, ScopeKind};
use std::collections::HashMap;

/// An alternate encoding: components separated by `delimiters`, in order
#[derive(Debug, Clone, Copy)]
pub struct DelimiterFormat {
    pub delimiters: &'static [char],
    /// Component holding the project id, if the format embeds one
    pub project_index: Option<usize>,
}

impl DelimiterFormat {
    pub const fn with_project(delimiters: &'static [char]) -> Self {
        Self {
            delimiters,
            project_index: Some(0),
        }
    }
}

/// How to resolve references to one target type
#[derive(Debug, Clone)]
pub struct LinkRule {
    pub target_type: &'static str,
    pub kind: ScopeKind,
    /// Path labels whose values, in order, make up the GET query
    pub path_labels: &'static [&'static str],
    /// Alternate encodings, tried in order
    pub fallbacks: &'static [DelimiterFormat],
    /// Accept a bare identifier when the query has a single component
    pub bare: bool,
}

impl LinkRule {
    fn new(
        target_type: &'static str,
        kind: ScopeKind,
        path_labels: &'static [&'static str],
    ) -> Self {
        Self {
            target_type,
            kind,
            path_labels,
            fallbacks: &[],
            bare: true,
        }
    }

    fn with_fallbacks(mut self, fallbacks: &'static [DelimiterFormat]) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    fn without_bare(mut self) -> Self {
        self.bare = false;
        self
    }
}

const BIGQUERY_DATASET_FORMATS: &[DelimiterFormat] = &[
    DelimiterFormat::with_project(&[':']),
    DelimiterFormat::with_project(&['.']),
];

const BIGQUERY_TABLE_FORMATS: &[DelimiterFormat] = &[
    DelimiterFormat::with_project(&[':', '.']),
    DelimiterFormat::with_project(&['.', '.']),
];

const BIGQUERY_CONNECTION_FORMATS: &[DelimiterFormat] = &[
    DelimiterFormat::with_project(&['.', '.']),
    DelimiterFormat::with_project(&['.', ';']),
];

/// Rules for every type the built-in mappers link to
pub fn builtin_rules() -> Vec<LinkRule> {
    vec![
        LinkRule::new("gcp-compute-instance", ScopeKind::Zonal, &["instances"]),
        LinkRule::new("gcp-compute-disk", ScopeKind::Zonal, &["disks"]),
        LinkRule::new("gcp-compute-image", ScopeKind::Project, &["images"]),
        LinkRule::new("gcp-compute-network", ScopeKind::Project, &["networks"]),
        LinkRule::new("gcp-compute-subnetwork", ScopeKind::Regional, &["subnetworks"]),
        LinkRule::new("gcp-iam-service-account", ScopeKind::Project, &["serviceAccounts"]),
        LinkRule::new("gcp-big-query-dataset", ScopeKind::Project, &["datasets"])
            .with_fallbacks(BIGQUERY_DATASET_FORMATS),
        LinkRule::new("gcp-big-query-table", ScopeKind::Project, &["datasets", "tables"])
            .with_fallbacks(BIGQUERY_TABLE_FORMATS)
            .without_bare(),
        LinkRule::new(
            "gcp-big-query-connection",
            ScopeKind::Project,
            &["locations", "connections"],
        )
        .with_fallbacks(BIGQUERY_CONNECTION_FORMATS)
        .without_bare(),
        LinkRule::new("gcp-cloud-kms-key-ring", ScopeKind::Project, &["locations", "keyRings"])
            .without_bare(),
        LinkRule::new(
            "gcp-cloud-kms-crypto-key",
            ScopeKind::Project,
            &["locations", "keyRings", "cryptoKeys"],
        )
        .without_bare(),
    ]
}

/// Builds edges from raw reference strings
#[derive(Debug, Clone)]
pub struct Linker {
    rules: HashMap<&'static str, LinkRule>,
}

impl Linker {
    pub fn new(rules: impl IntoIterator<Item = LinkRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.target_type, r)).collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_rules())
    }

    pub fn rule(&self, target_type: &str) -> Option<&LinkRule> {
        self.rules.get(target_type)
    }

    pub fn target_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.rules.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// GET edge to `target_type` from a raw reference, or `None` if it does not resolve
    pub fn link(
        &self,
        source: &Location,
        target_type: &str,
        raw: &str,
        propagation: BlastPropagation,
    ) -> Option<Edge> {
        let Some(rule) = self.rule(target_type) else {
            tracing::debug!("No link rule for {}", target_type);
            return None;
        };

        let Some((parts, target)) = resolve(rule, source, raw) else {
            tracing::trace!("Unresolvable {} reference: {}", target_type, raw);
            return None;
        };

        Some(Edge {
            target_type: rule.target_type.to_string(),
            method: QueryMethod::Get,
            query: composite_lookup_key(&parts),
            target_scope: target.scope(),
            propagation,
        })
    }

    /// SEARCH edge carrying the whole reference as its query.
    ///
    /// Used where the reference names a set rather than one item, such as an
    /// image family URL.
    pub fn search_link(
        &self,
        source: &Location,
        target_type: &str,
        raw: &str,
        propagation: BlastPropagation,
    ) -> Option<Edge> {
        let rule = self.rule(target_type)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let segments = path_segments(raw);
        let project = label_value(&segments, "projects");
        let target = derive_scope(rule.kind, source, &segments, project)?;

        Some(Edge {
            target_type: rule.target_type.to_string(),
            method: QueryMethod::Search,
            query: raw.to_string(),
            target_scope: target.scope(),
            propagation,
        })
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Resolve `raw` into query components and the target's location
fn resolve(rule: &LinkRule, source: &Location, raw: &str) -> Option<(Vec<String>, Location)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let segments = path_segments(raw);
    if let Some(values) = extract_path_values(&segments, rule.path_labels) {
        let project = label_value(&segments, "projects");
        let target = derive_scope(rule.kind, source, &segments, project)?;
        return Some((values, target));
    }

    // A path that lacks the expected labels is not one of the flat encodings
    if raw.contains('/') {
        return None;
    }

    let expected = rule.path_labels.len();
    for format in rule.fallbacks {
        let Some(mut components) = split_delimited(raw, format.delimiters) else {
            continue;
        };

        let project = match format.project_index {
            Some(index) if index < components.len() => Some(components.remove(index)),
            Some(_) => continue,
            None => None,
        };
        if components.len() != expected {
            continue;
        }

        let target = derive_scope(rule.kind, source, &[], project.as_deref())?;
        return Some((components, target));
    }

    if rule.bare && expected == 1 && !raw.contains(char::is_whitespace) {
        let project = project_from_service_account_email(raw);
        let target = derive_scope(rule.kind, source, &[], project)?;
        return Some((vec![raw.to_string()], target));
    }

    None
}

/// Non-empty `/`-separated segments of a reference
pub fn path_segments(raw: &str) -> Vec<&str> {
    raw.split('/').filter(|s| !s.is_empty()).collect()
}

/// Value following the first occurrence of `label`
pub fn label_value<'a>(segments: &[&'a str], label: &str) -> Option<&'a str> {
    segments
        .windows(2)
        .find(|w| w[0] == label)
        .map(|w| w[1])
}

/// Values following each of `labels`, which must appear in that order.
///
/// Returns `None` unless every label is found with a value after it.
pub fn extract_path_values(segments: &[&str], labels: &[&str]) -> Option<Vec<String>> {
    if labels.is_empty() {
        return None;
    }

    let mut values = Vec::with_capacity(labels.len());
    let mut cursor = 0;
    for label in labels {
        let offset = segments[cursor..].iter().position(|s| s == label)?;
        let value = segments.get(cursor + offset + 1)?;
        values.push((*value).to_string());
        cursor += offset + 2;
    }
    Some(values)
}

/// Split on each delimiter once, in order.
///
/// Succeeds only when every delimiter is present, every component is
/// non-empty and the last component holds none of the format's delimiters.
pub fn split_delimited(raw: &str, delimiters: &[char]) -> Option<Vec<String>> {
    if delimiters.is_empty() {
        return None;
    }

    let mut components = Vec::with_capacity(delimiters.len() + 1);
    let mut rest = raw;
    for delimiter in delimiters {
        let (head, tail) = rest.split_once(*delimiter)?;
        if head.is_empty() {
            return None;
        }
        components.push(head.to_string());
        rest = tail;
    }

    if rest.is_empty() || rest.contains(delimiters) {
        return None;
    }
    components.push(rest.to_string());
    Some(components)
}

/// `name@project.iam.gserviceaccount.com` -> `project`
fn project_from_service_account_email(raw: &str) -> Option<&str> {
    let (_, domain) = raw.split_once('@')?;
    let project = domain.strip_suffix(".iam.gserviceaccount.com")?;
    (!project.is_empty()).then_some(project)
}

/// Location of the target, preferring what the reference states explicitly
fn derive_scope(
    kind: ScopeKind,
    source: &Location,
    segments: &[&str],
    project: Option<&str>,
) -> Option<Location> {
    let project = project.unwrap_or_else(|| source.project_id()).to_string();

    match kind {
        ScopeKind::Project => Some(Location::project(project)),
        ScopeKind::Regional => {
            let region = label_value(segments, "regions")
                .or_else(|| label_value(segments, "locations"))
                .map(str::to_string)
                .or_else(|| source.effective_region())?;
            Some(Location::regional(project, region))
        },
        ScopeKind::Zonal => {
            let zone = label_value(segments, "zones")
                .or_else(|| label_value(segments, "locations"))
                .or_else(|| source.zone())?;
            Some(Location::zonal(project, zone))
        },
    }
}
