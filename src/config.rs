//! Configuration Management
//!
//! Locations to discover in and engine tunables. Read from
//! `<config_dir>/gcp-discovery/config.json` or an explicit path; YAML files
//! are accepted by extension.

use crate::gcp::auth;
use crate::location::{region_of_zone, LocationSet, ScopeKind};
use crate::resource::{EngineSettings, DEFAULT_FAN_OUT_CONCURRENCY, DEFAULT_STREAM_BUFFER};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub projects: Vec<String>,
    pub regions: Vec<String>,
    pub zones: Vec<String>,
    pub cache_ttl_secs: u64,
    /// Lifetime of NOTFOUND markers; the cache TTL when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found_ttl_secs: Option<u64>,
    /// Per-project aggregated list calls in flight
    pub fan_out_concurrency: usize,
    pub stream_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            regions: Vec::new(),
            zones: Vec::new(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            not_found_ttl_secs: None,
            fan_out_concurrency: DEFAULT_FAN_OUT_CONCURRENCY,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcp-discovery").join("config.json"))
    }

    /// Load configuration from the default path; a missing file is the default config
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`, as YAML for `.yaml`/`.yml` and JSON otherwise
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML config {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON config {}", path.display()))?
        };
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill unset locations from the gcloud defaults
    pub fn apply_gcloud_defaults(&mut self) {
        if self.projects.is_empty() {
            if let Some(project) = auth::get_default_project() {
                tracing::info!("Using gcloud default project {}", project);
                self.projects.push(project);
            }
        }
        if self.zones.is_empty() {
            if let Some(zone) = auth::get_default_zone() {
                tracing::info!("Using gcloud default zone {}", zone);
                self.zones.push(zone);
            }
        }
        if self.regions.is_empty() {
            if let Some(region) = auth::get_default_region() {
                self.regions.push(region);
            }
        }
    }

    /// Regions to serve: the configured ones, else those of the configured zones
    pub fn effective_regions(&self) -> Vec<String> {
        if !self.regions.is_empty() {
            return self.regions.clone();
        }
        let mut regions: Vec<String> = Vec::new();
        for zone in &self.zones {
            let region = region_of_zone(zone);
            if !regions.contains(&region) {
                regions.push(region);
            }
        }
        regions
    }

    /// Every configured location of `kind`
    pub fn location_set(&self, kind: ScopeKind) -> LocationSet {
        LocationSet::expand(&self.projects, &self.effective_regions(), &self.zones, kind)
    }

    pub fn settings(&self) -> EngineSettings {
        let cache_ttl = Duration::from_secs(self.cache_ttl_secs);
        EngineSettings {
            cache_ttl,
            not_found_ttl: self
                .not_found_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(cache_ttl),
            fan_out_concurrency: self.fan_out_concurrency.max(1),
            stream_buffer: self.stream_buffer.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let settings = config.settings();
        assert_eq!(settings.cache_ttl, Duration::from_secs(3600));
        assert_eq!(settings.not_found_ttl, settings.cache_ttl);
        assert_eq!(settings.fan_out_concurrency, 10);
        assert_eq!(settings.stream_buffer, 128);
    }

    #[test]
    fn test_load_json_with_partial_fields() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"projects": ["a", "b"], "zones": ["us-central1-a"], "fan_out_concurrency": 4}}"#)
            .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.projects, vec!["a", "b"]);
        assert_eq!(config.fan_out_concurrency, 4);
        assert_eq!(config.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "projects: [prod]\nregions:\n  - europe-west1\nnot_found_ttl_secs: 60").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.projects, vec!["prod"]);
        assert_eq!(config.regions, vec!["europe-west1"]);
        assert_eq!(config.settings().not_found_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_load_invalid_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "not json").unwrap();
        assert!(Config::load_from(file.path()).is_err());
        assert!(Config::load_from(Path::new("/nonexistent/config.json")).is_err());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            projects: vec!["p".to_string()],
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_regions_derived_from_zones() {
        let config = Config {
            projects: vec!["p".to_string()],
            zones: vec!["us-central1-a".to_string(), "us-central1-b".to_string()],
            ..Config::default()
        };
        assert_eq!(config.effective_regions(), vec!["us-central1"]);

        let regional = config.location_set(ScopeKind::Regional);
        assert_eq!(regional.scopes(), vec!["p.us-central1"]);
        assert_eq!(config.location_set(ScopeKind::Zonal).len(), 2);
        assert_eq!(config.location_set(ScopeKind::Project).scopes(), vec!["p"]);
    }
}
