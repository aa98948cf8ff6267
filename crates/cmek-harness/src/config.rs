//! Harness configuration.
//!
//! Loaded from a TOML file, optionally overridden from `CMEK_*`
//! environment variables, validated once, then shared read-only by every
//! scenario.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cmek_convergence::BackoffSchedule;
use cmek_model::names::region_of_zone;
use cmek_model::{KmsKeyName, StorageType, epoch_secs};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub project_id: String,
    /// Key protecting every cluster the harness creates.
    pub kms_key_name: String,
    /// Zone of the first cluster. Must lie in the key's region.
    pub primary_zone: String,
    /// Another zone of the primary zone's region.
    pub primary_region_second_zone: String,
    /// A zone outside the key's region, for the rejection check.
    pub secondary_zone: String,
    /// Poll until key status is `OK` before checking table metadata.
    #[serde(default)]
    pub wait_for_key_status: bool,
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,
    /// Seconds to wait after each unconverged attempt.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,
    #[serde(default = "default_serve_nodes")]
    pub serve_nodes: u32,
    #[serde(default)]
    pub storage_type: StorageType,
    /// Lifetime of the backup taken by the backup scenario.
    #[serde(default = "default_backup_ttl_secs")]
    pub backup_ttl_secs: u64,
}

fn default_instance_prefix() -> String {
    "cmek-it-".to_string()
}

fn default_backoff_secs() -> Vec<u64> {
    BackoffSchedule::DEFAULT_SECS.to_vec()
}

fn default_serve_nodes() -> u32 {
    1
}

fn default_backup_ttl_secs() -> u64 {
    6 * 60 * 60
}

impl HarnessConfig {
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        toml::from_str(content).map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> HarnessResult<String> {
        toml::to_string_pretty(self).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// Apply `CMEK_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> HarnessResult<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `CMEK_*` overrides from `lookup`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings = [
            ("CMEK_PROJECT_ID", &mut self.project_id),
            ("CMEK_KMS_KEY_NAME", &mut self.kms_key_name),
            ("CMEK_PRIMARY_ZONE", &mut self.primary_zone),
            (
                "CMEK_PRIMARY_REGION_SECOND_ZONE",
                &mut self.primary_region_second_zone,
            ),
            ("CMEK_SECONDARY_ZONE", &mut self.secondary_zone),
        ];
        for (name, field) in strings {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        }

        if let Some(value) = lookup("CMEK_WAIT_FOR_KEY_STATUS") {
            self.wait_for_key_status = parse_bool(&value).ok_or_else(|| {
                HarnessError::Config(format!("CMEK_WAIT_FOR_KEY_STATUS: not a boolean: {value}"))
            })?;
        }
        Ok(self)
    }

    /// Check the configuration before any resource is created.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.project_id.is_empty() {
            return Err(HarnessError::Config("project_id is empty".to_string()));
        }
        if self.kms_key_name.is_empty() {
            return Err(HarnessError::Config("kms_key_name is empty".to_string()));
        }
        KmsKeyName::parse(&self.kms_key_name).map_err(|e| HarnessError::Config(e.to_string()))?;

        let region = |zone: &str| {
            region_of_zone(zone)
                .map(str::to_string)
                .map_err(|e| HarnessError::Config(e.to_string()))
        };
        let primary = region(&self.primary_zone)?;
        let second = region(&self.primary_region_second_zone)?;
        let secondary = region(&self.secondary_zone)?;

        if self.primary_zone == self.primary_region_second_zone {
            return Err(HarnessError::Config(format!(
                "primary_zone and primary_region_second_zone are both {}",
                self.primary_zone
            )));
        }
        if primary != second {
            return Err(HarnessError::Config(format!(
                "primary_region_second_zone {} is not in region {primary}",
                self.primary_region_second_zone
            )));
        }
        if primary == secondary {
            return Err(HarnessError::Config(format!(
                "secondary_zone {} must be outside region {primary}",
                self.secondary_zone
            )));
        }
        if self.serve_nodes == 0 {
            return Err(HarnessError::Config("serve_nodes must be positive".to_string()));
        }
        if self.backup_ttl_secs == 0 {
            return Err(HarnessError::Config("backup_ttl_secs must be positive".to_string()));
        }
        if epoch_secs().checked_add(self.backup_ttl_secs).is_none() {
            return Err(HarnessError::Config(format!(
                "backup_ttl_secs {} overflows the backup expire time",
                self.backup_ttl_secs
            )));
        }
        self.schedule()?;
        Ok(())
    }

    pub fn schedule(&self) -> HarnessResult<BackoffSchedule> {
        BackoffSchedule::from_secs(&self.backoff_secs)
            .map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn backup_ttl(&self) -> Duration {
        Duration::from_secs(self.backup_ttl_secs)
    }

    /// A starting configuration in `us-central1`, rejecting in `us-east1`.
    pub fn scaffold(project_id: &str, kms_key_name: &str) -> Self {
        HarnessConfig {
            project_id: project_id.to_string(),
            kms_key_name: kms_key_name.to_string(),
            primary_zone: "us-central1-b".to_string(),
            primary_region_second_zone: "us-central1-c".to_string(),
            secondary_zone: "us-east1-b".to_string(),
            wait_for_key_status: false,
            instance_prefix: default_instance_prefix(),
            backoff_secs: default_backoff_secs(),
            serve_nodes: default_serve_nodes(),
            storage_type: StorageType::Ssd,
            backup_ttl_secs: default_backup_ttl_secs(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    const KEY: &str = "projects/p/locations/us-central1/keyRings/r/cryptoKeys/k";

    fn config() -> HarnessConfig {
        HarnessConfig::scaffold("p", KEY)
    }

    #[test]
    fn scaffold_is_valid() {
        config().validate().unwrap();
    }

    #[test]
    fn scaffold_roundtrips_toml() {
        let toml_str = config().to_toml_string().unwrap();
        assert!(toml_str.contains("us-central1-b"));
        assert!(toml_str.contains("storage_type = \"SSD\""));
        assert_eq!(HarnessConfig::from_toml_str(&toml_str).unwrap(), config());
    }

    #[test]
    fn overflowing_backup_ttl_rejected() {
        let mut config = config();
        config.backup_ttl_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, HarnessError::Config(ref msg) if msg.contains("backup_ttl_secs")));

        // Ten years is fine.
        config.backup_ttl_secs = 10 * 365 * 24 * 60 * 60;
        config.validate().unwrap();
    }

    #[test]
    fn parse_minimal_applies_defaults() {
        let toml_str = r#"
project_id = "p"
kms_key_name = "projects/p/locations/us-central1/keyRings/r/cryptoKeys/k"
primary_zone = "us-central1-b"
primary_region_second_zone = "us-central1-c"
secondary_zone = "us-east1-b"
"#;
        let config = HarnessConfig::from_toml_str(toml_str).unwrap();
        assert!(!config.wait_for_key_status);
        assert_eq!(config.backoff_secs, BackoffSchedule::DEFAULT_SECS.to_vec());
        assert_eq!(config.serve_nodes, 1);
        assert_eq!(config.backup_ttl(), Duration::from_secs(21_600));
        assert_eq!(config.instance_prefix, "cmek-it-");
    }

    #[test]
    fn missing_key_field_is_config_error() {
        let err = HarnessConfig::from_toml_str("project_id = \"p\"").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config().to_toml_string().unwrap().as_bytes())
            .unwrap();
        let loaded = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config());
    }

    #[test]
    fn env_overrides_replace_fields() {
        let env = HashMap::from([
            ("CMEK_KMS_KEY_NAME", "projects/q/locations/europe-west1/keyRings/r/cryptoKeys/k2"),
            ("CMEK_PRIMARY_ZONE", "europe-west1-b"),
            ("CMEK_WAIT_FOR_KEY_STATUS", "true"),
        ]);
        let config = config()
            .with_overrides_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert!(config.kms_key_name.ends_with("/cryptoKeys/k2"));
        assert_eq!(config.primary_zone, "europe-west1-b");
        assert!(config.wait_for_key_status);
        // Untouched.
        assert_eq!(config.secondary_zone, "us-east1-b");
    }

    #[test]
    fn bad_bool_override_rejected() {
        let err = config()
            .with_overrides_from(|name| {
                (name == "CMEK_WAIT_FOR_KEY_STATUS").then(|| "maybe".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn empty_key_rejected() {
        let mut config = config();
        config.kms_key_name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_key_rejected() {
        let mut config = config();
        config.kms_key_name = "my-key".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn secondary_zone_must_leave_region() {
        let mut config = config();
        config.secondary_zone = "us-central1-f".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn second_zone_must_share_region() {
        let mut config = config();
        config.primary_region_second_zone = "us-west1-a".to_string();
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.primary_region_second_zone = config.primary_zone.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_schedule_rejected() {
        let mut config = config();
        config.backoff_secs.clear();
        assert!(matches!(config.validate(), Err(HarnessError::Config(_))));
    }
}
