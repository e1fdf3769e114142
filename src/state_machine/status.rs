use std::fmt;

use serde::{Deserialize, Serialize};

/// Dashboard status of one workflow stage.
///
/// Recomputed from scratch on every evaluation:
/// pending → inprogress → {completed | long_running} | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "inprogress")]
    InProgress,
    #[serde(rename = "long_running")]
    LongRunning,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InProgress => "inprogress",
            WorkflowStatus::LongRunning => "long_running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    /// Completion rank: pending < inprogress = long_running < completed.
    /// `Failed` sits outside the ordering.
    pub fn completeness(&self) -> Option<u8> {
        match self {
            WorkflowStatus::Pending => Some(0),
            WorkflowStatus::InProgress | WorkflowStatus::LongRunning => Some(1),
            WorkflowStatus::Completed => Some(2),
            WorkflowStatus::Failed => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level processing cycle. Unknown labels are kept, upper-cased, in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SnapshotType {
    Eod,
    Sod,
    Aod,
    Eodpx,
    Other(String),
}

impl SnapshotType {
    /// Trims and upper-cases `raw` before matching, so parsing is idempotent.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "EOD" => SnapshotType::Eod,
            "SOD" => SnapshotType::Sod,
            "AOD" => SnapshotType::Aod,
            "EODPX" => SnapshotType::Eodpx,
            _ => SnapshotType::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SnapshotType::Eod => "EOD",
            SnapshotType::Sod => "SOD",
            SnapshotType::Aod => "AOD",
            SnapshotType::Eodpx => "EODPX",
            SnapshotType::Other(label) => label,
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SnapshotType {
    fn from(raw: String) -> Self {
        SnapshotType::parse(&raw)
    }
}

impl From<SnapshotType> for String {
    fn from(snapshot: SnapshotType) -> Self {
        snapshot.as_str().to_string()
    }
}

/// One step within a snapshot's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Raw,
    Enrich,
    Roll,
    Mart,
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "RAW",
            Stage::Enrich => "ENRICH",
            Stage::Roll => "ROLL",
            Stage::Mart => "MART",
            Stage::Final => "FINAL",
        }
    }

    /// Lower-case fragments that identify this stage inside a marker type or service name.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Stage::Raw => &["raw"],
            Stage::Enrich => &["enrich"],
            Stage::Roll => &["roll", "rollup"],
            Stage::Mart => &["mart"],
            Stage::Final => &["final"],
        }
    }

    /// Case-insensitive substring match of any stage keyword.
    pub fn matches_keyword(&self, marker_type: &str) -> bool {
        let lower = marker_type.to_lowercase();
        self.keywords().iter().any(|kw| lower.contains(kw))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the message ids that scoped an evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIdSource {
    /// Expected ids known to the transaction-log store.
    Atls,
    /// Ids observed in marker rows because ATLS had none for the key.
    AdmFallback,
    None,
}
