//! Parameterized SQL for the ADM marker union and the ATLS id tables.
//!
//! Every business value is bound through a `$n` placeholder. The only
//! text spliced into a statement is a table name from [`MessageOrigin`].

use chrono::NaiveDate;

use super::types::{MarkerSource, MessageOrigin, SqlParam, SqlQuery};
use crate::normalize::ClientRegion;

pub const COMBINED_MARKERS: &str = "combined_markers";
pub const AOD_PARENT: &str = "aod_parent";

/// The two business dates every fetch is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub business_date: NaiveDate,
    pub sod_date: NaiveDate,
}

impl DateWindow {
    pub fn new(business_date: NaiveDate, sod_date: NaiveDate) -> Self {
        Self {
            business_date,
            sod_date,
        }
    }

    fn params(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Date(self.business_date),
            SqlParam::Date(self.sod_date),
        ]
    }
}

/// Column expressions for one arm of the union, already aliased.
struct UnionArm {
    source: MarkerSource,
    last_updated: &'static str,
    client: &'static str,
    region: &'static str,
    snapshot: &'static str,
    marker_type: &'static str,
    subject_area: &'static str,
    message_id: &'static str,
    business_date: &'static str,
    status: &'static str,
    from: &'static str,
}

impl UnionArm {
    fn render(&self, pair: Option<&ClientRegion>) -> String {
        let mut predicates = vec![format!("CAST({} AS date) IN ($1, $2)", self.business_date)];
        if pair.is_some() {
            predicates.push(format!("UPPER(TRIM({})) = $3", self.client));
            predicates.push(format!("UPPER(TRIM({})) = $4", self.region));
        }
        format!(
            "SELECT\n    {} AS last_updated,\n    {} AS client_cd,\n    {} AS processing_region_cd,\n    \
             {} AS snapshot_type_cd,\n    {} AS marker_type_cd,\n    {} AS subject_area_cd,\n    \
             {} AS original_message_id,\n    CAST({} AS date) AS business_dt,\n    \
             '{}' AS status,\n    '{}' AS source\n{}\nWHERE {}",
            self.last_updated,
            self.client,
            self.region,
            self.snapshot,
            self.marker_type,
            self.subject_area,
            self.message_id,
            self.business_date,
            self.status,
            self.source.as_str(),
            self.from,
            predicates.join("\n  AND "),
        )
    }
}

const UNION_ARMS: [UnionArm; 4] = [
    UnionArm {
        source: MarkerSource::Markers,
        last_updated: "m.created_at",
        client: "m.client_cd",
        region: "m.processing_region_cd",
        snapshot: "m.snapshot_type_cd",
        marker_type: "m.marker_type_cd",
        subject_area: "m.subject_area_cd",
        message_id: "m.original_message_id",
        business_date: "m.business_dt",
        status: "success",
        from: "FROM markers m",
    },
    UnionArm {
        source: MarkerSource::FinalMarkers,
        last_updated: "fm.created_at",
        client: "fm.marker->'header'->>'party_cd'",
        region: "fm.marker->'header'->>'processing_region_cd'",
        snapshot: "fm.marker->'payload'->>'snapshot_type_cd'",
        marker_type: "fm.marker_type",
        subject_area: "fm.marker->'payload'->>'subject_area_cd'",
        message_id: "fm.original_message_id",
        business_date: "fm.marker->'payload'->>'business_date'",
        status: "success",
        from: "FROM final_markers fm",
    },
    UnionArm {
        source: MarkerSource::ErrorLogs,
        last_updated: "el.created_at",
        client: "m.client_cd",
        region: "m.processing_region_cd",
        snapshot: "m.snapshot_type_cd",
        marker_type: "el.service_nm",
        subject_area: "el.table_nm",
        message_id: "el.original_message_id",
        business_date: "m.business_dt",
        status: "failed",
        from: "FROM error_logs el\nJOIN markers m ON el.original_message_id = m.original_message_id",
    },
    UnionArm {
        source: MarkerSource::ReportingLoaders,
        last_updated: "r.created_at",
        client: "r.client_cd",
        region: "r.processing_region_cd",
        snapshot: "r.snapshot_type_cd",
        marker_type: "r.marker_type_cd",
        subject_area: "r.subject_area_cd",
        message_id: "r.original_message_id",
        business_date: "r.business_dt",
        status: "success",
        from: "FROM reporting_loaders_markers r",
    },
];

/// Four-source union over markers, final markers, error logs and
/// reporting-loader markers. With `pair` set, the client/region filter
/// is pushed into every arm as `$3`/`$4`.
pub fn combined_markers_query(window: &DateWindow, pair: Option<&ClientRegion>) -> SqlQuery {
    let text = UNION_ARMS
        .iter()
        .map(|arm| arm.render(pair))
        .collect::<Vec<_>>()
        .join("\n\nUNION ALL\n\n");

    let mut params = window.params();
    if let Some(pair) = pair {
        params.push(SqlParam::Text(pair.client.clone()));
        params.push(SqlParam::Text(pair.region.clone()));
    }

    SqlQuery {
        label: COMBINED_MARKERS,
        text,
        params,
    }
}

/// Message ids enumerated by one ATLS table for the window.
pub fn origin_ids_query(origin: MessageOrigin, window: &DateWindow) -> SqlQuery {
    let text = format!(
        "SELECT client_cd, processing_region_cd, snapshot_type_cd, \
         CAST(business_dt AS date) AS business_dt, original_message_id\n\
         FROM {}\n\
         WHERE CAST(business_dt AS date) IN ($1, $2)",
        origin.table()
    );
    SqlQuery {
        label: origin.table(),
        text,
        params: window.params(),
    }
}

/// Parent id of the first AOD accounting event among `ids`.
pub fn aod_parent_query(ids: &[String]) -> SqlQuery {
    SqlQuery {
        label: AOD_PARENT,
        text: "SELECT parent_original_message_id\n\
               FROM accounting_events\n\
               WHERE original_message_id = ANY($1)\n  \
               AND snapshot_type_cd = 'AOD'\n  \
               AND parent_original_message_id IS NOT NULL\n\
               LIMIT 1"
            .to_string(),
        params: vec![SqlParam::TextArray(ids.to_vec())],
    }
}
