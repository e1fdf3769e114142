//! Static workflow catalog: which stages exist, which subject areas each
//! must cover, which marker types signal completion, and the pipeline order
//! the dashboard displays them in.

use crate::error::{Result, StatusError};
use crate::origin::{MarkerRow, MarkerSource};
use crate::state_machine::{SnapshotType, Stage};

/// Rank assigned to workflow types absent from [`WORKFLOW_ORDER`].
pub const UNRANKED: u32 = 999;

/// Published once every AOD statement for a region is out.
pub const AOD_FINAL_MARKER: &str = "asOfRegionsStatementsPublished";

/// All-regions completion signal required on top of the AOD FINAL counts.
pub const GLOBAL_STATEMENTS_MARKER: &str = "eodAllRegionStatementsPublished";

pub const REGION_ALIASES: &[(&str, &str)] = &[
    ("GLOBAL", "GLOBAL"),
    ("Global", "GLOBAL"),
    ("Amer", "AMER"),
    ("AMER", "AMER"),
    ("EMEA", "EMEA"),
    ("APAC", "APAC"),
];

const PRICING_SUBJECTS: &[&str] = &["valuation_prices"];

const ACCOUNTING_SUBJECTS: &[&str] = &[
    "positions",
    "taxlots",
    "transactions",
    "cash_settlements",
    "disposal_lots",
];

const AOD_SUBJECTS: &[&str] = &["positions", "taxlots"];

const EOD_MART_MARKERS: &[&str] = &[
    "eodRegionPositionsMartLoadComplete",
    "eodRegionTaxlotsMartLoadComplete",
    "eodRegionTransactionsMartLoadComplete",
    "eodRegionDisposalLotsMartLoadComplete",
    "eodRegionCashSettlementsMartLoadComplete",
];

const SOD_MART_MARKERS: &[&str] = &[
    "sodRegionPositionsMartLoadComplete",
    "sodRegionTaxlotsMartLoadComplete",
    "sodRegionTransactionsMartLoadComplete",
    "sodRegionDisposalLotsMartLoadComplete",
    "sodRegionCashSettlementsMartLoadComplete",
];

/// Which success rows count as completion evidence for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerFilter {
    /// Exactly one marker type.
    Exact(&'static str),
    /// Any of a set of subject-specific marker types (MART fan-out).
    AnyOf(&'static [&'static str]),
    /// Marker type contains the stage keyword.
    StageKeyword(Stage),
    /// Rows that came from the final-markers source.
    FinalMarkers,
}

impl MarkerFilter {
    pub fn matches(&self, row: &MarkerRow) -> bool {
        match self {
            MarkerFilter::Exact(marker) => row.marker_type == *marker,
            MarkerFilter::AnyOf(markers) => markers.contains(&row.marker_type.as_str()),
            MarkerFilter::StageKeyword(stage) => stage.matches_keyword(&row.marker_type),
            MarkerFilter::FinalMarkers => row.source == MarkerSource::FinalMarkers,
        }
    }
}

/// One stage the dashboard evaluates for every (client, region).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowCatalogEntry {
    pub workflow_type: &'static str,
    pub snapshot: SnapshotType,
    pub stage: Stage,
    pub expected_subjects: &'static [&'static str],
    pub marker_filter: MarkerFilter,
}

impl WorkflowCatalogEntry {
    pub fn is_aod(&self) -> bool {
        self.snapshot == SnapshotType::Aod
    }

    /// AOD FINAL also waits for the all-regions marker.
    pub fn requires_global_marker(&self) -> bool {
        self.is_aod() && self.stage == Stage::Final
    }
}

const fn entry(
    workflow_type: &'static str,
    snapshot: SnapshotType,
    stage: Stage,
    expected_subjects: &'static [&'static str],
    marker_filter: MarkerFilter,
) -> WorkflowCatalogEntry {
    WorkflowCatalogEntry {
        workflow_type,
        snapshot,
        stage,
        expected_subjects,
        marker_filter,
    }
}

#[rustfmt::skip]
static WORKFLOW_CATALOG: [WorkflowCatalogEntry; 20] = [
    // Pricing (EODPX)
    entry("pricing_raw", SnapshotType::Eodpx, Stage::Raw, PRICING_SUBJECTS, MarkerFilter::StageKeyword(Stage::Raw)),
    entry("pricing_enrich", SnapshotType::Eodpx, Stage::Enrich, PRICING_SUBJECTS, MarkerFilter::StageKeyword(Stage::Enrich)),
    entry("pricing_roll", SnapshotType::Eodpx, Stage::Roll, PRICING_SUBJECTS, MarkerFilter::StageKeyword(Stage::Roll)),
    entry("pricing_mart", SnapshotType::Eodpx, Stage::Mart, PRICING_SUBJECTS, MarkerFilter::StageKeyword(Stage::Mart)),
    entry("pricing_final", SnapshotType::Eodpx, Stage::Final, PRICING_SUBJECTS, MarkerFilter::FinalMarkers),
    // EOD
    entry("eod_raw", SnapshotType::Eod, Stage::Raw, ACCOUNTING_SUBJECTS, MarkerFilter::Exact("eodRegionSubjectAreaRawLoadComplete")),
    entry("eod_enrich", SnapshotType::Eod, Stage::Enrich, ACCOUNTING_SUBJECTS, MarkerFilter::Exact("eodRegionSubjectAreaEnriched")),
    entry("eod_roll", SnapshotType::Eod, Stage::Roll, ACCOUNTING_SUBJECTS, MarkerFilter::Exact("eodRegionSubjectAreaRollupComplete")),
    entry("eod_mart", SnapshotType::Eod, Stage::Mart, ACCOUNTING_SUBJECTS, MarkerFilter::AnyOf(EOD_MART_MARKERS)),
    entry("eod_final", SnapshotType::Eod, Stage::Final, ACCOUNTING_SUBJECTS, MarkerFilter::FinalMarkers),
    // AOD
    entry("aod_raw", SnapshotType::Aod, Stage::Raw, AOD_SUBJECTS, MarkerFilter::Exact("asOfRegionSubjectAreaRawLoadComplete")),
    entry("aod_enrich", SnapshotType::Aod, Stage::Enrich, AOD_SUBJECTS, MarkerFilter::Exact("asOfRegionSubjectAreaEnriched")),
    entry("aod_roll", SnapshotType::Aod, Stage::Roll, AOD_SUBJECTS, MarkerFilter::Exact("asOfRegionSubjectAreaRollupComplete")),
    entry("aod_mart", SnapshotType::Aod, Stage::Mart, AOD_SUBJECTS, MarkerFilter::Exact("asOfRegionSubjectAreaMartLoadComplete")),
    entry("aod_final", SnapshotType::Aod, Stage::Final, AOD_SUBJECTS, MarkerFilter::Exact(AOD_FINAL_MARKER)),
    // SOD
    entry("sod_raw", SnapshotType::Sod, Stage::Raw, ACCOUNTING_SUBJECTS, MarkerFilter::Exact("sodRegionSubjectAreaRawLoadComplete")),
    entry("sod_enrich", SnapshotType::Sod, Stage::Enrich, ACCOUNTING_SUBJECTS, MarkerFilter::Exact("sodRegionSubjectAreaEnriched")),
    entry("sod_roll", SnapshotType::Sod, Stage::Roll, ACCOUNTING_SUBJECTS, MarkerFilter::Exact("sodRegionSubjectAreaRollupComplete")),
    entry("sod_mart", SnapshotType::Sod, Stage::Mart, ACCOUNTING_SUBJECTS, MarkerFilter::AnyOf(SOD_MART_MARKERS)),
    entry("sod_final", SnapshotType::Sod, Stage::Final, ACCOUNTING_SUBJECTS, MarkerFilter::FinalMarkers),
];

/// Pipeline sequence: ARS signoffs, pricing, EOD, AOD, SOD.
pub const WORKFLOW_ORDER: &[(&str, u32)] = &[
    ("trading_ars", 1),
    ("pricing_ars", 2),
    ("pricing_marker", 3),
    ("pricing_raw", 4),
    ("pricing_enrich", 5),
    ("pricing_roll", 6),
    ("pricing_mart", 7),
    ("pricing_final", 8),
    ("eod_ars", 9),
    ("eod", 10),
    ("eod_marker", 11),
    ("eod_raw", 12),
    ("eod_enrich", 13),
    ("eod_roll", 14),
    ("eod_mart", 15),
    ("eod_final", 16),
    ("asof_events", 17),
    ("asof_marker", 18),
    ("aod", 19),
    ("aod_marker", 20),
    ("aod_raw", 21),
    ("aod_enrich", 22),
    ("aod_roll", 23),
    ("aod_mart", 24),
    ("aod_final", 25),
    ("sod_ars", 26),
    ("sod", 27),
    ("sod_marker", 28),
    ("sod_raw", 29),
    ("sod_enrich", 30),
    ("sod_roll", 31),
    ("sod_mart", 32),
    ("sod_final", 33),
];

/// Snapshots the reporting-loaders view walks, in display order.
pub const REPORTING_SNAPSHOTS: [SnapshotType; 4] = [
    SnapshotType::Eodpx,
    SnapshotType::Eod,
    SnapshotType::Aod,
    SnapshotType::Sod,
];

const EODPX_REPORTING: &[(&str, &str)] = &[(
    "eodpxReportingPricingLoadComplete",
    "reporting_valuation_prices",
)];

const EOD_REPORTING: &[(&str, &str)] = &[
    ("eodReportingIncomeReceivedLoadComplete", "reporting_income_received_results"),
    ("eodReportingSecurityMasterLoadComplete", "reporting_security_masters"),
    ("eodReportingPendingTradesLoadComplete", "pending_trades"),
    ("eodReportingDisposalLotsLoadComplete", "reporting_disposal_lots"),
    ("eodReportingPositionsNAVLoadComplete", "reporting_account_nava"),
    ("eodReportingAccountSummaryByAssetTypeLoadComplete", "reporting_account_summary_by_asset_types"),
    ("eodReportingLedgerCashBalancesLoadComplete", "reporting_ledger_cash_balances"),
    ("eodReportingPositionsLoadComplete", "reporting_positions"),
    ("eodReportingTaxlotsLoadComplete", "reporting_taxlots"),
    ("eodReportingCashStatementLoadComplete", "reporting_cash_statements"),
    ("eodReportingGLCategoriesLoadForPositionsComplete", "position_gl_categories"),
    ("eodReportingPendingFxTradesLoadComplete", "reporting_pending_fx_trades"),
    ("eodReportingPendingEXSPOTTradesLoadComplete", "reporting_pending_fx_trades"),
    ("eodReportingIncomeReceivableLoadComplete", "reporting_income_receivables"),
    ("eodReportingTotalNetAssetsAndCashFlowsComplete", "reporting_transactions_cash_flows"),
    ("eodReportingAccountMasterLoadComplete", "reporting_account_masters"),
    ("eodReportingEarnedIncomeLoadComplete", "reporting_earned_income_results"),
    ("eodReportingOTCETDRecordsLoadComplete", "reporting_otcs_etds"),
    ("eodReportingTransactionsSettlementsLoadComplete", "reporting_transactions_settlements"),
];

const AOD_REPORTING: &[(&str, &str)] = &[
    ("aodReportingPendingTradesLoadComplete", "pending_trades"),
    ("aodReportingDisposalLotsLoadComplete", "reporting_disposal_lots"),
    ("aodReportingPositionsNAVLoadComplete", "reporting_account_nava"),
    ("aodReportingAccountSummaryByAssetTypeLoadComplete", "reporting_account_summary_by_asset_types"),
    ("aodReportingLedgerCashBalancesLoadComplete", "reporting_ledger_cash_balances"),
    ("aodReportingPositionsLoadComplete", "reporting_positions"),
    ("aodReportingTaxlotsLoadComplete", "reporting_taxlots"),
];

const SOD_REPORTING: &[(&str, &str)] = &[
    ("sodReportingPositionsNAVLoadComplete", "reporting_account_nava"),
    ("sodReportingAccountSummaryByAssetTypeLoadComplete", "reporting_account_summary_by_asset_types"),
    ("sodReportingLedgerCashBalancesLoadComplete", "reporting_ledger_cash_balances"),
    ("sodReportingPositionsLoadComplete", "reporting_positions"),
    ("sodReportingTaxlotsLoadComplete", "reporting_taxlots"),
    ("sodReportingCashStatementLoadComplete", "reporting_cash_statements"),
    ("sodReportingGLCategoriesLoadForPositionsComplete", "position_gl_categories"),
    ("sodReportingPendingFxTradesLoadComplete", "reporting_pending_fx_trades"),
    ("sodReportingPendingEXSPOTTradesLoadComplete", "reporting_pending_fx_trades"),
    ("sodReportingIncomeReceivableLoadComplete", "reporting_income_receivables"),
    ("sodReportingTransactionsSettlementsLoadComplete", "reporting_transactions_settlements"),
    ("sodpxReportingPricingLoadComplete", "reporting_valuation_prices"),
];

pub fn catalog() -> &'static [WorkflowCatalogEntry] {
    &WORKFLOW_CATALOG
}

pub fn lookup(workflow_type: &str) -> Result<&'static WorkflowCatalogEntry> {
    WORKFLOW_CATALOG
        .iter()
        .find(|e| e.workflow_type == workflow_type)
        .ok_or_else(|| StatusError::CatalogLookupMiss(workflow_type.to_string()))
}

pub fn workflow_order(workflow_type: &str) -> Result<u32> {
    WORKFLOW_ORDER
        .iter()
        .find(|(name, _)| *name == workflow_type)
        .map(|(_, rank)| *rank)
        .ok_or_else(|| StatusError::CatalogLookupMiss(workflow_type.to_string()))
}

/// Like [`workflow_order`], but unknown types rank last instead of failing.
pub fn workflow_rank(workflow_type: &str) -> u32 {
    workflow_order(workflow_type).unwrap_or(UNRANKED)
}

/// Stable sort by pipeline rank; ties keep their input order.
pub fn sort_by_workflow_order<T>(items: &mut [T], workflow_type: impl Fn(&T) -> &str) {
    items.sort_by_key(|item| workflow_rank(workflow_type(item)));
}

/// Fixed (marker type, subject area) pairs each reporting snapshot loads.
pub fn reporting_markers(snapshot: &SnapshotType) -> &'static [(&'static str, &'static str)] {
    match snapshot {
        SnapshotType::Eodpx => EODPX_REPORTING,
        SnapshotType::Eod => EOD_REPORTING,
        SnapshotType::Aod => AOD_REPORTING,
        SnapshotType::Sod => SOD_REPORTING,
        SnapshotType::Other(_) => &[],
    }
}
