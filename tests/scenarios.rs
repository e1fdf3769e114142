use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use stagewatch::cache::TtlRowCache;
use stagewatch::catalog::{catalog, AOD_FINAL_MARKER, GLOBAL_STATEMENTS_MARKER};
use stagewatch::normalize::calculate_sod_date;
use stagewatch::origin::{OriginDb, OriginError, OriginStore, SqlQuery, SqlRow, SqlValue};
use stagewatch::state_machine::{
    MessageIdSource, SnapshotType, StageEvaluator, WorkflowStatus, WorkflowStatusResult,
};
use stagewatch::{OrchestratorSettings, WorkflowOrchestrator};

/// Answers each query by its label; unknown labels return no rows.
#[derive(Default)]
struct ScriptedStore {
    responses: HashMap<&'static str, Vec<SqlRow>>,
    failing: Vec<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedStore {
    fn with(mut self, label: &'static str, rows: Vec<SqlRow>) -> Self {
        self.responses.entry(label).or_default().extend(rows);
        self
    }

    fn failing(mut self, label: &'static str) -> Self {
        self.failing.push(label);
        self
    }
}

impl OriginStore for ScriptedStore {
    async fn query(
        &self,
        origin: OriginDb,
        query: &SqlQuery,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SqlRow>, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&query.label) {
            return Err(OriginError::Fetch {
                origin,
                label: query.label.to_string(),
                message: "connection refused".into(),
            });
        }
        Ok(self.responses.get(query.label).cloned().unwrap_or_default())
    }
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

fn atls_id(snapshot: &str, id: &str) -> SqlRow {
    SqlRow::new()
        .with("client_cd", SqlValue::Text("ACME".into()))
        .with("processing_region_cd", SqlValue::Text("AMER".into()))
        .with("snapshot_type_cd", SqlValue::Text(snapshot.into()))
        .with("business_dt", SqlValue::Date(monday()))
        .with("original_message_id", SqlValue::Text(id.into()))
}

struct Marker<'a> {
    snapshot: &'a str,
    marker: &'a str,
    subject: &'a str,
    id: &'a str,
    status: &'a str,
    source: &'a str,
    minutes_ago: i64,
}

impl<'a> Marker<'a> {
    fn success(snapshot: &'a str, marker: &'a str, subject: &'a str, id: &'a str) -> Self {
        Self {
            snapshot,
            marker,
            subject,
            id,
            status: "success",
            source: "markers",
            minutes_ago: 5,
        }
    }

    fn row(&self) -> SqlRow {
        SqlRow::new()
            .with(
                "last_updated",
                SqlValue::Timestamp(Utc::now() - TimeDelta::minutes(self.minutes_ago)),
            )
            .with("client_cd", SqlValue::Text("acme".into()))
            .with("processing_region_cd", SqlValue::Text("Amer".into()))
            .with("snapshot_type_cd", SqlValue::Text(self.snapshot.into()))
            .with("marker_type_cd", SqlValue::Text(self.marker.into()))
            .with("subject_area_cd", SqlValue::Text(self.subject.into()))
            .with("original_message_id", SqlValue::Text(self.id.into()))
            .with("business_dt", SqlValue::Date(monday()))
            .with("status", SqlValue::Text(self.status.into()))
            .with("source", SqlValue::Text(self.source.into()))
    }
}

fn find<'a>(results: &'a [WorkflowStatusResult], workflow_type: &str) -> &'a WorkflowStatusResult {
    results
        .iter()
        .find(|r| r.workflow_type == workflow_type)
        .unwrap_or_else(|| panic!("no result for {workflow_type}"))
}

#[tokio::test]
async fn nothing_anywhere_is_all_pending() {
    let orchestrator = WorkflowOrchestrator::new(ScriptedStore::default());
    let results = orchestrator
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;

    assert_eq!(results.len(), catalog().len());
    for result in &results {
        assert_eq!(result.client, "ACME");
        assert_eq!(result.region, "AMER");
        assert_eq!(result.status, WorkflowStatus::Pending);
        assert_eq!(result.last_updated, None);
        assert_eq!(result.diagnostic, None);
    }
}

#[tokio::test]
async fn pricing_raw_and_enrich_complete_others_pending() {
    let store = ScriptedStore::default()
        .with("pricing_events", vec![atls_id("EODPX", "MSG1")])
        .with(
            "combined_markers",
            vec![
                Marker::success("EODPX", "pricingRawLoadComplete", "valuation_prices", "MSG1").row(),
                Marker::success("EODPX", "pricingEnrichmentComplete", "valuation_prices", "MSG1")
                    .row(),
            ],
        );
    let orchestrator = WorkflowOrchestrator::new(store);
    let results = orchestrator
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;

    assert_eq!(find(&results, "pricing_raw").status, WorkflowStatus::Completed);
    assert_eq!(find(&results, "pricing_enrich").status, WorkflowStatus::Completed);
    assert_eq!(find(&results, "pricing_roll").status, WorkflowStatus::Pending);
    assert_eq!(find(&results, "pricing_mart").status, WorkflowStatus::Pending);

    let raw = find(&results, "pricing_raw");
    assert_eq!(raw.original_message_id.as_deref(), Some("MSG1"));
    assert_eq!(raw.message_id_source, MessageIdSource::Atls);
    assert!(raw.last_updated.is_some());
}

#[tokio::test]
async fn aod_partial_taxlots_is_in_progress() {
    let marker = "asOfRegionSubjectAreaRawLoadComplete";
    let mut rows = Vec::new();
    for id in ["A1", "A2", "A3"] {
        rows.push(Marker::success("AOD", marker, "positions", id).row());
    }
    for id in ["A1", "A2"] {
        rows.push(Marker::success("AOD", marker, "taxlots", id).row());
    }
    let store = ScriptedStore::default()
        .with(
            "accounting_events",
            ["A1", "A2", "A3"].iter().map(|id| atls_id("AOD", id)).collect(),
        )
        .with("combined_markers", rows)
        .with(
            "aod_parent",
            vec![SqlRow::new().with("parent_original_message_id", SqlValue::Text("BATCH-7".into()))],
        );
    let orchestrator = WorkflowOrchestrator::new(store);
    let results = orchestrator
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;

    let aod_raw = find(&results, "aod_raw");
    assert_eq!(aod_raw.status, WorkflowStatus::InProgress);
    assert_eq!(aod_raw.total_count, Some(3));
    assert_eq!(aod_raw.positions_count, Some(3));
    assert_eq!(aod_raw.taxlots_count, Some(2));
    assert_eq!(aod_raw.parent_message_id.as_deref(), Some("BATCH-7"));
    assert_eq!(find(&results, "eod_raw").parent_message_id, None);
}

#[tokio::test]
async fn aod_final_without_global_marker_is_not_completed() {
    let mut rows = Vec::new();
    for id in ["A1", "A2", "A3"] {
        rows.push(Marker::success("AOD", AOD_FINAL_MARKER, "positions", id).row());
        rows.push(Marker::success("AOD", AOD_FINAL_MARKER, "taxlots", id).row());
    }
    let ids: Vec<SqlRow> = ["A1", "A2", "A3"].iter().map(|id| atls_id("AOD", id)).collect();

    let store = ScriptedStore::default()
        .with("accounting_events", ids.clone())
        .with("combined_markers", rows.clone());
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;
    let aod_final = find(&results, "aod_final");
    assert_eq!(aod_final.status, WorkflowStatus::InProgress);
    assert_eq!(aod_final.positions_count, Some(3));
    assert_eq!(aod_final.taxlots_count, Some(3));

    rows.push(Marker::success("AOD", GLOBAL_STATEMENTS_MARKER, "statements", "G1").row());
    let store = ScriptedStore::default()
        .with("accounting_events", ids)
        .with("combined_markers", rows);
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;
    assert_eq!(find(&results, "aod_final").status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn saturday_business_date_rolls_sod_to_monday() {
    let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
    assert_eq!(calculate_sod_date(saturday), monday);

    let results = WorkflowOrchestrator::new(ScriptedStore::default())
        .get_workflow_status(&[("ACME", "Amer")], saturday)
        .await;
    for result in results.iter().filter(|r| r.snapshot_type == SnapshotType::Sod) {
        assert_eq!(result.business_date, monday);
    }
}

#[tokio::test]
async fn enrich_failure_overrides_success() {
    let subjects = [
        "positions",
        "taxlots",
        "transactions",
        "cash_settlements",
        "disposal_lots",
    ];
    let mut rows: Vec<SqlRow> = subjects
        .iter()
        .map(|s| Marker::success("EOD", "eodRegionSubjectAreaEnriched", s, "E1").row())
        .collect();
    rows.push(
        Marker {
            status: "failed",
            source: "error_logs",
            minutes_ago: 1,
            ..Marker::success("EOD", "adm-enrichment-service", "positions", "E1")
        }
        .row(),
    );
    let store = ScriptedStore::default()
        .with("accounting_events", vec![atls_id("EOD", "E1")])
        .with("combined_markers", rows);
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;

    let enrich = find(&results, "eod_enrich");
    assert_eq!(enrich.status, WorkflowStatus::Failed);
    assert!(enrich.diagnostic.as_deref().unwrap().contains("adm-enrichment-service"));
    assert_eq!(find(&results, "eod_raw").status, WorkflowStatus::Pending);
}

#[tokio::test]
async fn marker_fetch_failure_degrades_every_pair() {
    let store = ScriptedStore::default().failing("combined_markers");
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer"), ("BETA", "Global")], monday())
        .await;

    assert_eq!(results.len(), 2 * catalog().len());
    assert!(results.iter().all(|r| r.status == WorkflowStatus::Pending
        && r.last_updated.is_none()
        && r.diagnostic.as_deref().is_some_and(|d| d.contains("connection refused"))));
    assert!(results.iter().any(|r| r.region == "GLOBAL"));
}

#[tokio::test]
async fn strict_mode_reports_pending_without_atls_ids() {
    let rows = vec![Marker::success("EODPX", "pricingRawLoadComplete", "valuation_prices", "X1").row()];

    let lenient = WorkflowOrchestrator::new(
        ScriptedStore::default().with("combined_markers", rows.clone()),
    );
    let results = lenient.get_workflow_status(&[("ACME", "Amer")], monday()).await;
    let raw = find(&results, "pricing_raw");
    assert_eq!(raw.status, WorkflowStatus::Completed);
    assert_eq!(raw.message_id_source, MessageIdSource::AdmFallback);

    let strict = WorkflowOrchestrator::new(ScriptedStore::default().with("combined_markers", rows))
        .with_settings(OrchestratorSettings {
            evaluator: StageEvaluator::new(TimeDelta::minutes(30), false),
            ..OrchestratorSettings::default()
        });
    let results = strict.get_workflow_status(&[("ACME", "Amer")], monday()).await;
    let raw = find(&results, "pricing_raw");
    assert_eq!(raw.status, WorkflowStatus::Pending);
    assert_eq!(raw.message_id_source, MessageIdSource::None);
}

#[tokio::test]
async fn stale_partial_stage_is_long_running() {
    let stale = Marker {
        minutes_ago: 45,
        ..Marker::success("EOD", "eodRegionSubjectAreaRawLoadComplete", "positions", "E1")
    };
    let store = ScriptedStore::default()
        .with("accounting_events", vec![atls_id("EOD", "E1")])
        .with("combined_markers", vec![stale.row()]);
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;
    let raw = find(&results, "eod_raw");
    assert_eq!(raw.status, WorkflowStatus::LongRunning);
    assert_eq!(raw.subjects_found, vec!["positions"]);
}

#[tokio::test]
async fn workflow_then_reporting_shares_one_fetch() {
    let loader = Marker {
        source: "reporting_loaders_markers",
        ..Marker::success(
            "EOD",
            "eodReportingTaxlotsLoadComplete",
            "reporting_taxlots",
            "R1",
        )
    };
    let store = ScriptedStore::default().with("combined_markers", vec![loader.row()]);
    let orchestrator =
        WorkflowOrchestrator::new(store).with_cache(Arc::new(TtlRowCache::new()));

    orchestrator
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;
    let calls_after_status = orchestrator.store().calls.load(Ordering::SeqCst);

    let loaders = orchestrator
        .get_reporting_loaders_status("acme", "AMER", monday(), &SnapshotType::Eod)
        .await;
    assert_eq!(orchestrator.store().calls.load(Ordering::SeqCst), calls_after_status);

    let taxlots = loaders
        .iter()
        .find(|r| r.marker_type == "eodReportingTaxlotsLoadComplete")
        .unwrap();
    assert_eq!(taxlots.status, WorkflowStatus::Completed);
    assert!(loaders
        .iter()
        .filter(|r| r.marker_type != "eodReportingTaxlotsLoadComplete")
        .all(|r| r.status == WorkflowStatus::Pending));
}

#[tokio::test]
async fn results_follow_pipeline_order_per_stage() {
    let results = WorkflowOrchestrator::new(ScriptedStore::default())
        .get_workflow_status(&[("ACME", "Amer"), ("BETA", "EMEA")], monday())
        .await;
    let order: Vec<&str> = results.iter().map(|r| r.workflow_type.as_str()).collect();
    assert_eq!(&order[..2], ["pricing_raw", "pricing_raw"]);
    assert_eq!(results[0].client, "ACME");
    assert_eq!(results[1].client, "BETA");
    assert_eq!(&order[order.len() - 2..], ["sod_final", "sod_final"]);
}

#[tokio::test]
async fn malformed_row_for_one_pair_leaves_others_intact() {
    let good = Marker::success("EODPX", "pricingRawLoadComplete", "valuation_prices", "MSG1").row();
    let mut dirty = Marker {
        status: "failed",
        source: "error_logs",
        ..Marker::success("EODPX", "ignored", "valuation_prices", "B1")
    }
    .row();
    dirty.push("client_cd", SqlValue::Text("BETA".into()));
    dirty.push("marker_type_cd", SqlValue::Null);

    let store = ScriptedStore::default()
        .with("pricing_events", vec![atls_id("EODPX", "MSG1")])
        .with("combined_markers", vec![good, dirty]);
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer"), ("BETA", "Amer")], monday())
        .await;

    let acme_raw = results
        .iter()
        .find(|r| r.client == "ACME" && r.workflow_type == "pricing_raw")
        .unwrap();
    assert_eq!(acme_raw.status, WorkflowStatus::Completed);
    assert_eq!(acme_raw.diagnostic, None);
    assert!(results
        .iter()
        .filter(|r| r.client == "BETA")
        .all(|r| r.status == WorkflowStatus::Pending && r.diagnostic.is_none()));
}

#[tokio::test]
async fn aod_failure_beats_converged_counts() {
    let marker = "asOfRegionSubjectAreaRawLoadComplete";
    let mut rows = Vec::new();
    for id in ["A1", "A2", "A3"] {
        rows.push(Marker::success("AOD", marker, "positions", id).row());
        rows.push(Marker::success("AOD", marker, "taxlots", id).row());
    }
    rows.push(
        Marker {
            status: "failed",
            source: "error_logs",
            minutes_ago: 1,
            ..Marker::success("AOD", "aod-raw-loader", "positions", "A3")
        }
        .row(),
    );
    let store = ScriptedStore::default()
        .with(
            "accounting_events",
            ["A1", "A2", "A3"].iter().map(|id| atls_id("AOD", id)).collect(),
        )
        .with("combined_markers", rows);
    let results = WorkflowOrchestrator::new(store)
        .get_workflow_status(&[("ACME", "Amer")], monday())
        .await;

    let aod_raw = find(&results, "aod_raw");
    assert_eq!(aod_raw.positions_count, Some(3));
    assert_eq!(aod_raw.taxlots_count, Some(3));
    assert_eq!(aod_raw.status, WorkflowStatus::Failed);
    assert_eq!(
        aod_raw.diagnostic.as_deref(),
        Some("aod-raw-loader failed for positions")
    );
}
