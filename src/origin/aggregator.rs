use std::collections::HashMap;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::OriginStore;
use super::sql::{aod_parent_query, combined_markers_query, origin_ids_query, DateWindow};
use super::types::{
    MarkerRow, MarkerSource, MessageOrigin, OriginDb, OriginMessageId, SqlRow, SqlValue,
};
use crate::error::{Result, StatusError};
use crate::normalize::{validate_message_id, CanonicalKey, ClientRegion};

const SUMMARY_SAMPLES: usize = 3;

/// Expected message ids per canonical key, in fetch order, without repeats.
#[derive(Debug, Clone, Default)]
pub struct MessageIdIndex {
    by_key: HashMap<CanonicalKey, Vec<OriginMessageId>>,
}

impl MessageIdIndex {
    pub fn from_ids(ids: impl IntoIterator<Item = OriginMessageId>) -> Self {
        let mut index = Self::default();
        for id in ids {
            index.insert(id);
        }
        index
    }

    pub fn insert(&mut self, id: OriginMessageId) {
        let bucket = self.by_key.entry(id.key.clone()).or_default();
        if !bucket.iter().any(|known| known.id == id.id) {
            bucket.push(id);
        }
    }

    pub fn ids_for(&self, key: &CanonicalKey) -> Vec<&str> {
        self.by_key
            .get(key)
            .map(|ids| ids.iter().map(|id| id.id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    fn keys(&self) -> impl Iterator<Item = (&CanonicalKey, &Vec<OriginMessageId>)> {
        self.by_key.iter()
    }
}

/// Fetches marker facts from ADM and expected message ids from ATLS.
///
/// Failures propagate as [`StatusError`](crate::error::StatusError); the
/// orchestrator decides how to degrade.
pub struct MarkerSourceAggregator<'a, S: OriginStore> {
    store: &'a S,
}

impl<'a, S: OriginStore> MarkerSourceAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Unioned marker rows for the window, optionally narrowed to one pair.
    pub async fn fetch_marker_rows(
        &self,
        window: &DateWindow,
        pair: Option<&ClientRegion>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MarkerRow>> {
        let started = Instant::now();
        let query = combined_markers_query(window, pair);
        let raw = self.store.query(OriginDb::Adm, &query, cancel).await?;
        let mut rows = Vec::with_capacity(raw.len());
        let mut rejected = 0usize;
        for row in &raw {
            match MarkerRow::from_sql_row(row) {
                Ok(marker) => rows.push(marker),
                Err(err) => {
                    rejected += 1;
                    log_rejected(query.label, row, &err);
                }
            }
        }

        let reporting = rows
            .iter()
            .filter(|row| row.source == MarkerSource::ReportingLoaders)
            .count();
        info!(
            rows = rows.len(),
            reporting_rows = reporting,
            rejected_rows = rejected,
            filtered = pair.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched combined marker rows"
        );
        Ok(rows)
    }

    /// Accounting and pricing message ids for the window. Rows without an
    /// id are skipped.
    pub async fn fetch_origin_message_ids(
        &self,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<MessageIdIndex> {
        let started = Instant::now();
        let (accounting, pricing) = tokio::join!(
            self.fetch_origin(MessageOrigin::Accounting, window, cancel),
            self.fetch_origin(MessageOrigin::Pricing, window, cancel),
        );
        let mut ids = accounting?;
        ids.extend(pricing?);

        let index = MessageIdIndex::from_ids(ids);
        info!(
            ids = index.len(),
            keys = index.by_key.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched ATLS message ids"
        );
        for (key, ids) in index.keys() {
            let samples: Vec<&str> = ids
                .iter()
                .take(SUMMARY_SAMPLES)
                .map(|id| id.id.as_str())
                .collect();
            debug!(
                client = %key.client,
                region = %key.region,
                snapshot = %key.snapshot,
                business_date = %key.business_date,
                count = ids.len(),
                ?samples,
                "ATLS ids for key"
            );
        }
        Ok(index)
    }

    async fn fetch_origin(
        &self,
        origin: MessageOrigin,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<OriginMessageId>> {
        let query = origin_ids_query(origin, window);
        let raw = self.store.query(OriginDb::Atls, &query, cancel).await?;
        let mut ids = Vec::with_capacity(raw.len());
        let mut rejected = 0usize;
        for row in &raw {
            match OriginMessageId::from_sql_row(row, origin) {
                Ok(Some(id)) => ids.push(id),
                Ok(None) => {}
                Err(err) => {
                    rejected += 1;
                    log_rejected(query.label, row, &err);
                }
            }
        }
        if rejected > 0 {
            warn!(table = origin.table(), rejected_rows = rejected, "rejected malformed ATLS rows");
        }
        Ok(ids)
    }

    /// First non-null AOD parent id among `ids`. Ids that fail format
    /// validation are left out of the lookup.
    pub async fn fetch_aod_parent_id(
        &self,
        ids: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let valid: Vec<String> = ids
            .iter()
            .filter(|id| validate_message_id(id).is_ok())
            .map(|id| id.to_string())
            .collect();
        if valid.is_empty() {
            return Ok(None);
        }

        let query = aod_parent_query(&valid);
        let rows = self.store.query(OriginDb::Atls, &query, cancel).await?;
        Ok(rows.first().and_then(|row| {
            match row.get("parent_original_message_id") {
                Some(SqlValue::Text(parent)) if !parent.is_empty() => Some(parent.clone()),
                _ => None,
            }
        }))
    }
}

// A malformed row is dropped alone; the rest of the batch stands.
fn log_rejected(label: &str, row: &SqlRow, err: &StatusError) {
    let text = |column: &str| match row.get(column) {
        Some(SqlValue::Text(value)) => value.clone(),
        _ => String::new(),
    };
    warn!(
        query = label,
        client = %text("client_cd"),
        region = %text("processing_region_cd"),
        source = %text("source"),
        error = %err,
        "rejected malformed row"
    );
}
