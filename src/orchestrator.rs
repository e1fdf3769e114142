use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, RowCache, TtlRowCache};
use crate::catalog::{catalog, reporting_markers, sort_by_workflow_order, REPORTING_SNAPSHOTS};
use crate::config::StagewatchConfig;
use crate::error::{Result, StatusError};
use crate::grouping::GroupedRows;
use crate::normalize::{
    calculate_sod_date, normalize_client, normalize_region, CanonicalKey, ClientRegion,
};
use crate::origin::{
    DateWindow, MarkerRow, MarkerSource, MarkerSourceAggregator, MessageIdIndex, OriginStore,
};
use crate::state_machine::{
    MessageIdSource, ReportingLoaderResult, SnapshotType, StageEvaluator, WorkflowStatus,
    WorkflowStatusResult,
};

const FALLBACK_SAMPLES: usize = 3;

/// Tunables the orchestrator threads through evaluation and caching.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub evaluator: StageEvaluator,
    pub cache_ttl: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            evaluator: StageEvaluator::default(),
            cache_ttl: Duration::from_secs(20),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &StagewatchConfig) -> Self {
        Self {
            evaluator: StageEvaluator::from_config(config),
            cache_ttl: config.cache_ttl(),
        }
    }
}

/// Drives fetch, grouping and evaluation for one request.
///
/// Origin failures never escape: affected entries come back as `pending`
/// with a diagnostic.
pub struct WorkflowOrchestrator<S: OriginStore> {
    store: S,
    cache: Option<Arc<dyn RowCache>>,
    settings: OrchestratorSettings,
}

impl<S: OriginStore> WorkflowOrchestrator<S> {
    /// Create an orchestrator with default settings and no cache.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: None,
            settings: OrchestratorSettings::default(),
        }
    }

    /// Attach a row cache shared by the workflow and reporting views.
    pub fn with_cache(mut self, cache: Arc<dyn RowCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Settings from config, plus an in-process cache unless the TTL is zero.
    pub fn from_config(store: S, config: &StagewatchConfig) -> Self {
        let orchestrator = Self::new(store).with_settings(OrchestratorSettings::from_config(config));
        if config.cache_ttl_secs > 0 {
            orchestrator.with_cache(Arc::new(TtlRowCache::new()))
        } else {
            orchestrator
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get_workflow_status<P: AsRef<str>>(
        &self,
        pairs: &[(P, P)],
        business_date: NaiveDate,
    ) -> Vec<WorkflowStatusResult> {
        self.get_workflow_status_with_cancel(pairs, business_date, &CancellationToken::new())
            .await
    }

    /// Every (client, region) × catalog entry, sorted by pipeline order.
    pub async fn get_workflow_status_with_cancel<P: AsRef<str>>(
        &self,
        pairs: &[(P, P)],
        business_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Vec<WorkflowStatusResult> {
        let now = Utc::now();
        let sod_date = calculate_sod_date(business_date);
        let window = DateWindow::new(business_date, sod_date);

        let mut results = Vec::new();
        let mut valid: Vec<ClientRegion> = Vec::new();
        for (client, region) in pairs {
            let (client, region) = (client.as_ref(), region.as_ref());
            match ClientRegion::parse(client, region) {
                Ok(pair) if valid.contains(&pair) => {}
                Ok(pair) => valid.push(pair),
                Err(err) => {
                    warn!(client, region, error = %err, "skipping invalid client/region");
                    let raw = ClientRegion {
                        client: normalize_client(client),
                        region: normalize_region(region),
                    };
                    results.extend(placeholders(&raw, &window, &err.to_string()));
                }
            }
        }

        if valid.is_empty() {
            sort_by_workflow_order(&mut results, |r| r.workflow_type.as_str());
            return results;
        }

        let filter = match valid.as_slice() {
            [single] => Some(single),
            _ => None,
        };
        let aggregator = MarkerSourceAggregator::new(&self.store);
        let (rows, ids) = tokio::join!(
            aggregator.fetch_marker_rows(&window, filter, cancel),
            aggregator.fetch_origin_message_ids(&window, cancel),
        );
        let (rows, ids) = match (rows, ids) {
            (Ok(rows), Ok(ids)) => (rows, ids),
            (Err(err), _) | (_, Err(err)) => {
                log_degraded(&err, valid.len());
                let diagnostic = err.to_string();
                for pair in &valid {
                    results.extend(placeholders(pair, &window, &diagnostic));
                }
                sort_by_workflow_order(&mut results, |r| r.workflow_type.as_str());
                return results;
            }
        };

        let rows = Arc::new(rows);
        self.cache_rows(&valid, business_date, &rows);

        let started = Instant::now();
        let mut grouped = GroupedRows::group(&rows);
        if let Some(pair) = filter {
            let pruned = grouped.retain_pair(pair);
            debug!(pruned, "pruned rows outside the requested pair");
        }
        info!(
            groups = grouped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "grouped marker rows"
        );

        for pair in &valid {
            let parent_id = self.aod_parent_id(pair, &ids, business_date, cancel).await;
            for entry in catalog() {
                let target_date = target_date(&entry.snapshot, &window);
                let key = CanonicalKey::for_pair(pair, &entry.snapshot, target_date);
                let expected = ids.ids_for(&key);
                let evaluation =
                    self.settings
                        .evaluator
                        .evaluate(entry, grouped.get(&key), &expected, now);

                if evaluation.message_id_source == MessageIdSource::AdmFallback {
                    let samples: Vec<&str> = evaluation
                        .message_ids
                        .iter()
                        .take(FALLBACK_SAMPLES)
                        .map(String::as_str)
                        .collect();
                    warn!(
                        client = %pair.client,
                        region = %pair.region,
                        workflow_type = entry.workflow_type,
                        ids = evaluation.message_ids.len(),
                        ?samples,
                        "no ATLS ids for key, scoped by ids observed in markers"
                    );
                }

                let parent = if entry.is_aod() { parent_id.clone() } else { None };
                results.push(WorkflowStatusResult::from_evaluation(
                    pair,
                    entry,
                    target_date,
                    evaluation,
                    parent,
                ));
            }
        }

        sort_by_workflow_order(&mut results, |r| r.workflow_type.as_str());
        results
    }

    pub async fn get_reporting_loaders_status(
        &self,
        client: &str,
        region: &str,
        business_date: NaiveDate,
        snapshot: &SnapshotType,
    ) -> Vec<ReportingLoaderResult> {
        self.get_reporting_loaders_status_with_cancel(
            client,
            region,
            business_date,
            snapshot,
            &CancellationToken::new(),
        )
        .await
    }

    /// Reporting-layer loads for one snapshot. Reuses cached rows when the
    /// workflow view fetched them moments ago.
    pub async fn get_reporting_loaders_status_with_cancel(
        &self,
        client: &str,
        region: &str,
        business_date: NaiveDate,
        snapshot: &SnapshotType,
        cancel: &CancellationToken,
    ) -> Vec<ReportingLoaderResult> {
        let window = DateWindow::new(business_date, calculate_sod_date(business_date));
        match self.reporting_rows(client, region, &window, cancel).await {
            Ok((pair, rows)) => {
                reporting_results(&pair, &GroupedRows::group(&rows), &window, snapshot)
            }
            Err((pair, diagnostic)) => reporting_placeholders(&pair, &window, snapshot, &diagnostic),
        }
    }

    pub async fn get_all_reporting_loaders_status(
        &self,
        client: &str,
        region: &str,
        business_date: NaiveDate,
    ) -> Vec<(SnapshotType, Vec<ReportingLoaderResult>)> {
        self.get_all_reporting_loaders_status_with_cancel(
            client,
            region,
            business_date,
            &CancellationToken::new(),
        )
        .await
    }

    /// Every reporting snapshot in display order, from a single fetch.
    pub async fn get_all_reporting_loaders_status_with_cancel(
        &self,
        client: &str,
        region: &str,
        business_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Vec<(SnapshotType, Vec<ReportingLoaderResult>)> {
        let window = DateWindow::new(business_date, calculate_sod_date(business_date));
        match self.reporting_rows(client, region, &window, cancel).await {
            Ok((pair, rows)) => {
                let grouped = GroupedRows::group(&rows);
                REPORTING_SNAPSHOTS
                    .iter()
                    .map(|snapshot| {
                        let results = reporting_results(&pair, &grouped, &window, snapshot);
                        (snapshot.clone(), results)
                    })
                    .collect()
            }
            Err((pair, diagnostic)) => REPORTING_SNAPSHOTS
                .iter()
                .map(|snapshot| {
                    let results = reporting_placeholders(&pair, &window, snapshot, &diagnostic);
                    (snapshot.clone(), results)
                })
                .collect(),
        }
    }

    async fn reporting_rows(
        &self,
        client: &str,
        region: &str,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> std::result::Result<(ClientRegion, Arc<Vec<MarkerRow>>), (ClientRegion, String)> {
        let pair = match ClientRegion::parse(client, region) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(client, region, error = %err, "skipping invalid client/region");
                let raw = ClientRegion {
                    client: normalize_client(client),
                    region: normalize_region(region),
                };
                return Err((raw, err.to_string()));
            }
        };
        match self.rows_for_pair(&pair, window, cancel).await {
            Ok(rows) => Ok((pair, rows)),
            Err(err) => {
                log_degraded(&err, 1);
                Err((pair, err.to_string()))
            }
        }
    }

    async fn rows_for_pair(
        &self,
        pair: &ClientRegion,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<Arc<Vec<MarkerRow>>> {
        let key = CacheKey::new(pair, window.business_date);
        if let Some(rows) = self.cache.as_ref().and_then(|cache| cache.get(&key)) {
            debug!(client = %pair.client, region = %pair.region, rows = rows.len(), "row cache hit");
            return Ok(rows);
        }

        let rows = MarkerSourceAggregator::new(&self.store)
            .fetch_marker_rows(window, Some(pair), cancel)
            .await?;
        let rows = Arc::new(rows);
        if let Some(cache) = &self.cache {
            cache.put(key, Arc::clone(&rows), self.settings.cache_ttl);
        }
        Ok(rows)
    }

    fn cache_rows(&self, pairs: &[ClientRegion], business_date: NaiveDate, rows: &Arc<Vec<MarkerRow>>) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let [pair] = pairs {
            cache.put(CacheKey::new(pair, business_date), Arc::clone(rows), self.settings.cache_ttl);
        } else {
            for pair in pairs {
                let subset: Vec<MarkerRow> = rows
                    .iter()
                    .filter(|row| row.key().matches_pair(pair))
                    .cloned()
                    .collect();
                cache.put(
                    CacheKey::new(pair, business_date),
                    Arc::new(subset),
                    self.settings.cache_ttl,
                );
            }
        }
        debug!(pairs = pairs.len(), "cached marker rows");
    }

    /// Display-only; lookup failures are logged and yield `None`.
    async fn aod_parent_id(
        &self,
        pair: &ClientRegion,
        ids: &MessageIdIndex,
        business_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let key = CanonicalKey::for_pair(pair, &SnapshotType::Aod, business_date);
        let aod_ids = ids.ids_for(&key);
        if aod_ids.is_empty() {
            return None;
        }
        match MarkerSourceAggregator::new(&self.store)
            .fetch_aod_parent_id(&aod_ids, cancel)
            .await
        {
            Ok(parent) => parent,
            Err(err) => {
                warn!(
                    client = %pair.client,
                    region = %pair.region,
                    error = %err,
                    "AOD parent id lookup failed"
                );
                None
            }
        }
    }
}

fn target_date(snapshot: &SnapshotType, window: &DateWindow) -> NaiveDate {
    if *snapshot == SnapshotType::Sod {
        window.sod_date
    } else {
        window.business_date
    }
}

fn placeholders(pair: &ClientRegion, window: &DateWindow, diagnostic: &str) -> Vec<WorkflowStatusResult> {
    catalog()
        .iter()
        .map(|entry| {
            WorkflowStatusResult::pending(
                pair,
                entry,
                target_date(&entry.snapshot, window),
                Some(diagnostic.to_string()),
            )
        })
        .collect()
}

fn log_degraded(err: &StatusError, pairs: usize) {
    if err.is_timeout() {
        error!(error = %err, pairs, "origin query timed out, returning pending placeholders");
    } else {
        error!(error = %err, pairs, "origin fetch failed, returning pending placeholders");
    }
}

fn reporting_results(
    pair: &ClientRegion,
    grouped: &GroupedRows<'_>,
    window: &DateWindow,
    snapshot: &SnapshotType,
) -> Vec<ReportingLoaderResult> {
    let business_date = target_date(snapshot, window);
    let key = CanonicalKey::for_pair(pair, snapshot, business_date);
    let loader_rows: Vec<&MarkerRow> = grouped
        .get(&key)
        .iter()
        .copied()
        .filter(|row| row.source == MarkerSource::ReportingLoaders && row.is_success())
        .collect();

    reporting_markers(snapshot)
        .iter()
        .map(|(marker, subject)| {
            let latest = |subject_match: bool| {
                loader_rows
                    .iter()
                    .filter(|row| row.marker_type == *marker)
                    .filter(|row| !subject_match || row.subject_is(subject))
                    .max_by_key(|row| row.last_updated)
                    .copied()
            };
            let found = latest(true).or_else(|| latest(false));
            ReportingLoaderResult {
                client: pair.client.clone(),
                region: pair.region.clone(),
                business_date,
                snapshot_type: snapshot.clone(),
                marker_type: marker.to_string(),
                subject_area: subject.to_string(),
                last_updated: found.map(|row| row.last_updated),
                status: if found.is_some() {
                    WorkflowStatus::Completed
                } else {
                    WorkflowStatus::Pending
                },
                diagnostic: None,
            }
        })
        .collect()
}

fn reporting_placeholders(
    pair: &ClientRegion,
    window: &DateWindow,
    snapshot: &SnapshotType,
    diagnostic: &str,
) -> Vec<ReportingLoaderResult> {
    let business_date = target_date(snapshot, window);
    reporting_markers(snapshot)
        .iter()
        .map(|(marker, subject)| ReportingLoaderResult {
            client: pair.client.clone(),
            region: pair.region.clone(),
            business_date,
            snapshot_type: snapshot.clone(),
            marker_type: marker.to_string(),
            subject_area: subject.to_string(),
            last_updated: None,
            status: WorkflowStatus::Pending,
            diagnostic: Some(diagnostic.to_string()),
        })
        .collect()
}
