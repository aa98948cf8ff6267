//! Scenario identities, resource ids and reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cmek_model::EncryptionInfo;

/// Table created by the table and backup scenarios.
pub const TABLE_ID: &str = "test-table-for-cmek-it";

/// Backup created by the backup scenario.
pub const BACKUP_ID: &str = "test-table-for-cmek-it-backup";

/// Column family of the test table.
pub const COLUMN_FAMILY: &str = "cf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Key reported per cluster; cross-region cluster rejected.
    InstanceCluster,
    /// Table inherits the key; status transient or converged.
    Table,
    /// Backup pinned to a key version; status never tracked.
    Backup,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::InstanceCluster,
        ScenarioKind::Table,
        ScenarioKind::Backup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::InstanceCluster => "instance-cluster",
            ScenarioKind::Table => "table",
            ScenarioKind::Backup => "backup",
        }
    }

    /// Short suffix keeping instance ids distinct across scenarios.
    fn tag(&self) -> &'static str {
        match self {
            ScenarioKind::InstanceCluster => "ic",
            ScenarioKind::Table => "tb",
            ScenarioKind::Backup => "bk",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown scenario: {s}"))
    }
}

/// Resource ids one scenario run owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioIds {
    pub instance_id: String,
    /// CMEK cluster in the primary zone.
    pub cluster_id: String,
    /// CMEK cluster in the second zone of the primary region.
    pub second_cluster_id: String,
    /// Cluster that must be rejected (outside the key's region).
    pub rejected_cluster_id: String,
    pub table_id: String,
    pub backup_id: String,
}

impl ScenarioIds {
    /// `{prefix}{epoch_secs}-{tag}`, with clusters `-c1`, `-c2`, `-c3`.
    pub fn new(prefix: &str, kind: ScenarioKind, epoch_secs: u64) -> Self {
        let instance_id = format!("{prefix}{epoch_secs}-{}", kind.tag());
        Self {
            cluster_id: format!("{instance_id}-c1"),
            second_cluster_id: format!("{instance_id}-c2"),
            rejected_cluster_id: format!("{instance_id}-c3"),
            table_id: TABLE_ID.to_string(),
            backup_id: BACKUP_ID.to_string(),
            instance_id,
        }
    }
}

/// What a scenario saw on its way to a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    /// Encryption info the final checks ran against.
    pub encryption_info: Option<EncryptionInfo>,
    /// Number of entries in the table's per-cluster map.
    pub cluster_entries: Option<usize>,
    /// Fetches the poller needed, when it ran.
    pub poll_attempts: Option<usize>,
    /// Error the control plane returned for the rejected cluster.
    pub rejection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed { reason: String },
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: ScenarioKind,
    pub instance_id: String,
    pub verdict: Verdict,
    pub findings: Findings,
    pub duration_ms: u64,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_per_scenario() {
        let table = ScenarioIds::new("cmek-it-", ScenarioKind::Table, 1_700_000_000);
        let backup = ScenarioIds::new("cmek-it-", ScenarioKind::Backup, 1_700_000_000);
        assert_eq!(table.instance_id, "cmek-it-1700000000-tb");
        assert_eq!(table.cluster_id, "cmek-it-1700000000-tb-c1");
        assert_ne!(table.instance_id, backup.instance_id);
        assert_eq!(table.table_id, TABLE_ID);
    }

    #[test]
    fn kind_parses_from_name() {
        for kind in ScenarioKind::ALL {
            assert_eq!(kind.name().parse::<ScenarioKind>().unwrap(), kind);
        }
        assert!("nope".parse::<ScenarioKind>().is_err());
    }

    #[test]
    fn report_serializes_verdict() {
        let report = ScenarioReport {
            scenario: ScenarioKind::Backup,
            instance_id: "i".to_string(),
            verdict: Verdict::Failed {
                reason: "boom".to_string(),
            },
            findings: Findings::default(),
            duration_ms: 5,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scenario"], "backup");
        assert_eq!(json["verdict"]["result"], "failed");
        assert_eq!(json["verdict"]["reason"], "boom");
        assert!(!report.passed());
    }
}
