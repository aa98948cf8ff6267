//! Resource names for the admin API.
//!
//! Names follow the `projects/{project}/...` hierarchy. Zone names are
//! `{region}-{letter}`, so a zone's region is everything before the last
//! dash.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("malformed KMS key name: {0}")]
    MalformedKey(String),

    #[error("malformed zone: {0}")]
    MalformedZone(String),
}

pub fn location_name(project_id: &str, zone: &str) -> String {
    format!("projects/{project_id}/locations/{zone}")
}

/// Region a zone belongs to: `us-central1-b` → `us-central1`.
pub fn region_of_zone(zone: &str) -> Result<&str, NameError> {
    match zone.rsplit_once('-') {
        Some((region, suffix))
            if !region.is_empty()
                && suffix.len() == 1
                && suffix.chars().all(|c| c.is_ascii_lowercase()) =>
        {
            Ok(region)
        }
        _ => Err(NameError::MalformedZone(zone.to_string())),
    }
}

/// Parsed `projects/{p}/locations/{l}/keyRings/{r}/cryptoKeys/{k}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsKeyName {
    pub project: String,
    pub location: String,
    pub key_ring: String,
    pub crypto_key: String,
}

impl KmsKeyName {
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let parts: Vec<&str> = name.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "locations", location, "keyRings", key_ring, "cryptoKeys", crypto_key]
                if [project, location, key_ring, crypto_key]
                    .iter()
                    .all(|p| !p.is_empty()) =>
            {
                Ok(Self {
                    project: project.to_string(),
                    location: location.to_string(),
                    key_ring: key_ring.to_string(),
                    crypto_key: crypto_key.to_string(),
                })
            }
            _ => Err(NameError::MalformedKey(name.to_string())),
        }
    }

    /// Whether a cluster in `zone` may be protected by this key.
    pub fn covers_zone(&self, zone: &str) -> bool {
        region_of_zone(zone).is_ok_and(|region| region == self.location)
    }

    /// Name of version `n` of this key.
    pub fn version_name(&self, version: u32) -> String {
        format!("{self}/cryptoKeyVersions/{version}")
    }
}

impl fmt::Display for KmsKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.project, self.location, self.key_ring, self.crypto_key
        )
    }
}

impl FromStr for KmsKeyName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "projects/p/locations/us-central1/keyRings/ring/cryptoKeys/key";

    #[test]
    fn parse_key_roundtrips_display() {
        let key = KmsKeyName::parse(KEY).unwrap();
        assert_eq!(key.location, "us-central1");
        assert_eq!(key.crypto_key, "key");
        assert_eq!(key.to_string(), KEY);
    }

    #[test]
    fn parse_rejects_short_names() {
        assert!(KmsKeyName::parse("projects/p/locations/us-central1").is_err());
        assert!(KmsKeyName::parse("").is_err());
        assert!(KmsKeyName::parse("projects//locations/l/keyRings/r/cryptoKeys/k").is_err());
    }

    #[test]
    fn region_of_zone_strips_suffix() {
        assert_eq!(region_of_zone("us-central1-b").unwrap(), "us-central1");
        assert_eq!(region_of_zone("europe-west1-d").unwrap(), "europe-west1");
        assert!(region_of_zone("uscentral1").is_err());
        assert!(region_of_zone("us-central1-bb").is_err());
    }

    #[test]
    fn key_covers_same_region_zones_only() {
        let key = KmsKeyName::parse(KEY).unwrap();
        assert!(key.covers_zone("us-central1-b"));
        assert!(key.covers_zone("us-central1-c"));
        assert!(!key.covers_zone("us-east1-b"));
        assert!(!key.covers_zone("garbage"));
    }

    #[test]
    fn version_name_is_under_key() {
        let key = KmsKeyName::parse(KEY).unwrap();
        assert!(key.version_name(2).starts_with(KEY));
        assert!(key.version_name(2).ends_with("/cryptoKeyVersions/2"));
    }

    #[test]
    fn location_names() {
        assert_eq!(location_name("p", "us-east1-b"), "projects/p/locations/us-east1-b");
    }
}
