//! Stage evaluation over an already-grouped slice of marker rows.
//!
//! Nothing here does I/O and nothing is remembered between calls: every
//! evaluation recomputes the status from the full fact set it is handed.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use super::status::{MessageIdSource, WorkflowStatus};
use crate::catalog::{WorkflowCatalogEntry, GLOBAL_STATEMENTS_MARKER};
use crate::config::StagewatchConfig;
use crate::origin::{MarkerRow, MarkerSource};

const POSITIONS: &str = "positions";
const TAXLOTS: &str = "taxlots";

/// Distinct-id counts behind an AOD status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AodCounts {
    pub total_count: usize,
    pub positions_count: usize,
    pub taxlots_count: usize,
    pub global_marker: bool,
}

/// Everything the evaluator learned about one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvaluation {
    pub status: WorkflowStatus,
    pub subjects_found: Vec<String>,
    pub missing_subjects: Vec<String>,
    pub first_event: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Ids that scoped the evaluation, in scope order.
    pub message_ids: Vec<String>,
    pub message_id_source: MessageIdSource,
    pub aod_counts: Option<AodCounts>,
    /// Marker type and subject of the latest failed row, when one forced `failed`.
    pub failure: Option<String>,
    pub rows_considered: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct StageEvaluator {
    long_running_after: TimeDelta,
    adm_fallback: bool,
}

impl Default for StageEvaluator {
    fn default() -> Self {
        Self {
            long_running_after: TimeDelta::minutes(30),
            adm_fallback: true,
        }
    }
}

/// Ids in scope order, plus a set for membership checks.
struct Scope {
    ids: Vec<String>,
    lookup: HashSet<String>,
    source: MessageIdSource,
}

impl Scope {
    fn new(ids: Vec<String>, source: MessageIdSource) -> Self {
        let lookup = ids.iter().cloned().collect();
        Self { ids, lookup, source }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), MessageIdSource::None)
    }

    fn contains(&self, row: &MarkerRow) -> bool {
        row.original_message_id
            .as_deref()
            .is_some_and(|id| self.lookup.contains(id))
    }
}

impl StageEvaluator {
    pub fn new(long_running_after: TimeDelta, adm_fallback: bool) -> Self {
        Self {
            long_running_after,
            adm_fallback,
        }
    }

    pub fn from_config(config: &StagewatchConfig) -> Self {
        Self::new(
            config.long_running_threshold(),
            config.adm_fallback_when_atls_empty,
        )
    }

    /// Evaluates `entry` against the rows grouped under its canonical key.
    ///
    /// `expected_ids` are the ATLS ids for the same key. When empty and the
    /// ADM fallback is on, ids observed in this stage's rows take their place.
    pub fn evaluate(
        &self,
        entry: &WorkflowCatalogEntry,
        rows: &[&MarkerRow],
        expected_ids: &[&str],
        now: DateTime<Utc>,
    ) -> StageEvaluation {
        let pipeline_rows: Vec<&MarkerRow> = rows
            .iter()
            .copied()
            .filter(|row| row.source != MarkerSource::ReportingLoaders)
            .collect();

        let scope = self.resolve_scope(entry, &pipeline_rows, expected_ids);

        let success: Vec<&MarkerRow> = pipeline_rows
            .iter()
            .copied()
            .filter(|row| row.is_success() && entry.marker_filter.matches(row) && scope.contains(row))
            .collect();
        let failed: Vec<&MarkerRow> = pipeline_rows
            .iter()
            .copied()
            .filter(|row| {
                row.is_failed() && entry.stage.matches_keyword(&row.marker_type) && scope.contains(row)
            })
            .collect();

        let (subjects_found, missing_subjects) = split_subjects(entry.expected_subjects, &success);
        let first_event = success.iter().map(|row| row.last_updated).min();

        let (mut status, aod_counts, global_row) = if entry.is_aod() {
            let global_row = if entry.requires_global_marker() {
                pipeline_rows
                    .iter()
                    .copied()
                    .filter(|row| row.is_success() && row.marker_type == GLOBAL_STATEMENTS_MARKER)
                    .max_by_key(|row| row.last_updated)
            } else {
                None
            };
            let counts = AodCounts {
                total_count: scope.ids.len(),
                positions_count: distinct_ids_for_subject(&success, POSITIONS),
                taxlots_count: distinct_ids_for_subject(&success, TAXLOTS),
                global_marker: global_row.is_some(),
            };
            (
                evaluate_aod(&counts, entry.requires_global_marker()),
                Some(counts),
                global_row,
            )
        } else {
            let status = evaluate_subjects(
                &subjects_found,
                entry.expected_subjects,
                first_event,
                now,
                self.long_running_after,
            );
            (status, None, None)
        };

        let latest_failure = failed.iter().copied().max_by_key(|row| row.last_updated);
        let failure = latest_failure.map(|row| {
            format!(
                "{} failed for {}",
                row.marker_type,
                row.subject_area.as_deref().unwrap_or("unknown subject")
            )
        });
        if failure.is_some() {
            status = WorkflowStatus::Failed;
        }

        let last_updated = success
            .iter()
            .chain(failed.iter())
            .chain(global_row.iter())
            .map(|row| row.last_updated)
            .max();

        debug!(
            workflow_type = entry.workflow_type,
            status = %status,
            subjects_found = ?subjects_found,
            missing_subjects = ?missing_subjects,
            rows = pipeline_rows.len(),
            "stage evaluated"
        );

        StageEvaluation {
            status,
            subjects_found,
            missing_subjects,
            first_event,
            last_updated,
            message_ids: scope.ids,
            message_id_source: scope.source,
            aod_counts,
            failure,
            rows_considered: pipeline_rows.len(),
        }
    }

    fn resolve_scope(
        &self,
        entry: &WorkflowCatalogEntry,
        rows: &[&MarkerRow],
        expected_ids: &[&str],
    ) -> Scope {
        if !expected_ids.is_empty() {
            let mut seen = HashSet::new();
            let ids = expected_ids
                .iter()
                .filter(|id| seen.insert(**id))
                .map(|id| id.to_string())
                .collect();
            return Scope::new(ids, MessageIdSource::Atls);
        }

        if !self.adm_fallback {
            return Scope::empty();
        }

        let observed: BTreeSet<&str> = rows
            .iter()
            .filter(|row| {
                (row.is_success() && entry.marker_filter.matches(row))
                    || (row.is_failed() && entry.stage.matches_keyword(&row.marker_type))
            })
            .filter_map(|row| row.original_message_id.as_deref())
            .filter(|id| !id.is_empty())
            .collect();

        if observed.is_empty() {
            Scope::empty()
        } else {
            Scope::new(
                observed.into_iter().map(str::to_string).collect(),
                MessageIdSource::AdmFallback,
            )
        }
    }
}

/// Expected subjects split into (found, missing), both in catalog order.
fn split_subjects(expected: &[&str], rows: &[&MarkerRow]) -> (Vec<String>, Vec<String>) {
    expected
        .iter()
        .map(|subject| subject.to_string())
        .partition(|subject| rows.iter().any(|row| row.subject_is(subject)))
}

fn distinct_ids_for_subject(rows: &[&MarkerRow], subject: &str) -> usize {
    rows.iter()
        .filter(|row| row.subject_is(subject))
        .filter_map(|row| row.original_message_id.as_deref())
        .collect::<HashSet<_>>()
        .len()
}

/// Subject-set status for non-AOD stages.
pub fn evaluate_subjects(
    subjects_found: &[String],
    expected: &[&str],
    first_event: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    long_running_after: TimeDelta,
) -> WorkflowStatus {
    if subjects_found.is_empty() {
        return WorkflowStatus::Pending;
    }
    let complete = expected
        .iter()
        .all(|subject| subjects_found.iter().any(|found| found == subject));
    if complete {
        return WorkflowStatus::Completed;
    }
    match first_event {
        Some(first) if now - first > long_running_after => WorkflowStatus::LongRunning,
        Some(_) => WorkflowStatus::InProgress,
        None => WorkflowStatus::Pending,
    }
}

/// Count-based status for AOD stages.
pub fn evaluate_aod(counts: &AodCounts, requires_global_marker: bool) -> WorkflowStatus {
    if counts.total_count == 0 {
        return WorkflowStatus::Pending;
    }
    let converged =
        counts.positions_count == counts.total_count && counts.taxlots_count == counts.total_count;
    if converged && (!requires_global_marker || counts.global_marker) {
        return WorkflowStatus::Completed;
    }
    if counts.positions_count > 0 || counts.taxlots_count > 0 || counts.global_marker {
        WorkflowStatus::InProgress
    } else {
        WorkflowStatus::Pending
    }
}
