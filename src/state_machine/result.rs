use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::evaluator::StageEvaluation;
use super::status::{MessageIdSource, SnapshotType, Stage, WorkflowStatus};
use crate::catalog::WorkflowCatalogEntry;
use crate::normalize::ClientRegion;

/// One dashboard row: a catalog stage evaluated for one (client, region).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStatusResult {
    pub client: String,
    pub region: String,
    pub workflow_type: String,
    pub snapshot_type: SnapshotType,
    pub stage: Stage,
    pub status: WorkflowStatus,
    pub subjects_found: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub business_date: NaiveDate,
    /// First id in scope, shown as the representative transaction.
    pub original_message_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub original_message_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    pub message_id_source: MessageIdSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxlots_count: Option<usize>,
    /// Why the record is degraded or failed, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl WorkflowStatusResult {
    /// Placeholder used when nothing is known about the stage.
    pub fn pending(
        pair: &ClientRegion,
        entry: &WorkflowCatalogEntry,
        business_date: NaiveDate,
        diagnostic: Option<String>,
    ) -> Self {
        Self {
            client: pair.client.clone(),
            region: pair.region.clone(),
            workflow_type: entry.workflow_type.to_string(),
            snapshot_type: entry.snapshot.clone(),
            stage: entry.stage,
            status: WorkflowStatus::Pending,
            subjects_found: Vec::new(),
            last_updated: None,
            business_date,
            original_message_id: None,
            original_message_ids: Vec::new(),
            parent_message_id: None,
            message_id_source: MessageIdSource::None,
            total_count: None,
            positions_count: None,
            taxlots_count: None,
            diagnostic,
        }
    }

    pub fn from_evaluation(
        pair: &ClientRegion,
        entry: &WorkflowCatalogEntry,
        business_date: NaiveDate,
        evaluation: StageEvaluation,
        parent_message_id: Option<String>,
    ) -> Self {
        let counts = evaluation.aod_counts;
        Self {
            client: pair.client.clone(),
            region: pair.region.clone(),
            workflow_type: entry.workflow_type.to_string(),
            snapshot_type: entry.snapshot.clone(),
            stage: entry.stage,
            status: evaluation.status,
            subjects_found: evaluation.subjects_found,
            last_updated: evaluation.last_updated,
            business_date,
            original_message_id: evaluation.message_ids.first().cloned(),
            original_message_ids: evaluation.message_ids,
            parent_message_id,
            message_id_source: evaluation.message_id_source,
            total_count: counts.map(|c| c.total_count),
            positions_count: counts.map(|c| c.positions_count),
            taxlots_count: counts.map(|c| c.taxlots_count),
            diagnostic: evaluation.failure,
        }
    }
}

/// Status of one reporting-layer load for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportingLoaderResult {
    pub client: String,
    pub region: String,
    pub business_date: NaiveDate,
    pub snapshot_type: SnapshotType,
    pub marker_type: String,
    pub subject_area: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::lookup;

    #[test]
    fn pending_placeholder_serializes_null_last_updated() {
        let pair = ClientRegion::parse("acme", "Amer").unwrap();
        let entry = lookup("sod_mart").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let result = WorkflowStatusResult::pending(&pair, entry, date, None);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["snapshot_type"], "SOD");
        assert_eq!(json["stage"], "MART");
        assert_eq!(json["business_date"], "2024-03-05");
        assert!(json["last_updated"].is_null());
        assert_eq!(json["message_id_source"], "none");
        assert!(json.get("total_count").is_none());
        assert!(json.get("diagnostic").is_none());
    }
}
