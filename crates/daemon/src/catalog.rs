//! The job catalog: every job the daemon may run, keyed by name.
//!
//! Loaded once at startup from a JSON file. A catalog entry describes how
//! to run the job inside the process boundary (command + argument bag),
//! whether it participates in `add-all`, its optional cron trigger, and an
//! optional per-job retry override.

use std::collections::BTreeMap;
use std::path::Path;

use forager_core::error::CoreError;
use forager_core::schedule::parse_cron;
use serde::{Deserialize, Serialize};

/// One runnable job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Command and arguments run by the process boundary.
    #[serde(default)]
    pub command: Vec<String>,
    /// JSON parameter bag piped to the job on stdin.
    #[serde(default)]
    pub args: serde_json::Value,
    /// Whether `add-all` includes this job.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Optional cron trigger (classic five-field form accepted).
    #[serde(default)]
    pub schedule: Option<String>,
    /// Per-job override of the daemon-wide retry limit.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

/// All configured jobs, ordered by name for stable iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobCatalog {
    pub jobs: BTreeMap<String, JobSpec>,
}

impl JobCatalog {
    /// Load and validate a catalog from a JSON file.
    ///
    /// A missing file yields an empty catalog — a daemon with no configured
    /// jobs is valid (jobs can still arrive over the control surface when
    /// an in-process boundary is used). Invalid JSON or an invalid cron
    /// trigger fails startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Job catalog file not found, starting empty");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Internal(format!("cannot read {}: {e}", path.display())))?;
        let catalog: Self = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Validation(format!("invalid catalog {}: {e}", path.display())))?;

        for (name, spec) in &catalog.jobs {
            if let Some(cron) = &spec.schedule {
                parse_cron(cron).map_err(|e| {
                    CoreError::Validation(format!("job \"{name}\": {e}"))
                })?;
            }
        }

        tracing::info!(jobs = catalog.jobs.len(), "Job catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Names of all enabled jobs, in catalog order.
    pub fn enabled_names(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// (name, cron) pairs for every enabled job with a trigger.
    pub fn scheduled(&self) -> Vec<(String, String)> {
        self.jobs
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .filter_map(|(name, spec)| {
                spec.schedule.as_ref().map(|cron| (name.clone(), cron.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_catalog(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_jobs_with_defaults() {
        let file = write_catalog(
            r#"{
                "jobs": {
                    "ao3": {"command": ["spider", "ao3"], "schedule": "0 2 * * *"},
                    "nifty": {"command": ["spider", "nifty"], "enabled": false}
                }
            }"#,
        );

        let catalog = JobCatalog::load(file.path()).unwrap();
        assert!(catalog.contains("ao3"));
        assert!(catalog.get("ao3").unwrap().enabled);
        assert_eq!(catalog.enabled_names(), vec!["ao3"]);
        assert_eq!(
            catalog.scheduled(),
            vec![("ao3".to_string(), "0 2 * * *".to_string())]
        );
    }

    #[test]
    fn missing_file_yields_empty_catalog() {
        let catalog = JobCatalog::load("/definitely/not/there.json").unwrap();
        assert!(catalog.jobs.is_empty());
    }

    #[test]
    fn invalid_cron_fails_load() {
        let file = write_catalog(
            r#"{"jobs": {"bad": {"command": ["x"], "schedule": "sometimes"}}}"#,
        );
        assert!(JobCatalog::load(file.path()).is_err());
    }

    #[test]
    fn invalid_json_fails_load() {
        let file = write_catalog("{not json");
        assert!(JobCatalog::load(file.path()).is_err());
    }
}
