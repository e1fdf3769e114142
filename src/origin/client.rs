use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::OriginError;
use super::types::{NaiveTimestampZone, OriginDb, SqlParam, SqlQuery, SqlRow, SqlValue};
use crate::config::StagewatchConfig;
use crate::error::{Result, StatusError};

/// Read-only access to the two origin stores.
///
/// Implementations run one parameterized query and hand back decoded rows.
/// Tests substitute an in-memory store keyed by [`SqlQuery::label`].
#[allow(async_fn_in_trait)]
pub trait OriginStore {
    async fn query(
        &self,
        origin: OriginDb,
        query: &SqlQuery,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<SqlRow>, OriginError>;
}

/// Postgres-backed store with one pool per origin.
pub struct PgOriginStore {
    atls: PgPool,
    adm: PgPool,
    query_timeout: Duration,
    naive_zone: NaiveTimestampZone,
}

impl PgOriginStore {
    /// Builds lazy pools for both databases. The server-side
    /// `statement_timeout` mirrors the client-side ceiling.
    pub fn connect(config: &StagewatchConfig) -> Result<Self> {
        config.require_database_urls()?;
        let atls = Self::pool(config, &config.atls_database_url, OriginDb::Atls)?;
        let adm = Self::pool(config, &config.adm_database_url, OriginDb::Adm)?;
        Ok(Self::from_pools(atls, adm, config.query_timeout())
            .with_naive_zone(config.naive_timestamp_zone))
    }

    pub fn from_pools(atls: PgPool, adm: PgPool, query_timeout: Duration) -> Self {
        Self {
            atls,
            adm,
            query_timeout,
            naive_zone: NaiveTimestampZone::default(),
        }
    }

    /// Zone used to place `timestamp without time zone` values on the UTC line.
    pub fn with_naive_zone(mut self, zone: NaiveTimestampZone) -> Self {
        self.naive_zone = zone;
        self
    }

    fn pool(config: &StagewatchConfig, url: &str, origin: OriginDb) -> Result<PgPool> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e| StatusError::Config(format!("invalid {origin} database url: {e}")))?;
        let options = options.options([(
            "statement_timeout",
            format!("{}s", config.query_timeout_secs),
        )]);

        Ok(PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(options))
    }

    fn pool_for(&self, origin: OriginDb) -> &PgPool {
        match origin {
            OriginDb::Atls => &self.atls,
            OriginDb::Adm => &self.adm,
        }
    }
}

impl OriginStore for PgOriginStore {
    async fn query(
        &self,
        origin: OriginDb,
        query: &SqlQuery,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<SqlRow>, OriginError> {
        let mut statement = sqlx::query(&query.text);
        for param in &query.params {
            statement = match param {
                SqlParam::Text(value) => statement.bind(value.clone()),
                SqlParam::Date(value) => statement.bind(*value),
                SqlParam::TextArray(values) => statement.bind(values.clone()),
            };
        }

        let started = Instant::now();
        let fetch = tokio::time::timeout(
            self.query_timeout,
            statement.fetch_all(self.pool_for(origin)),
        );

        let rows = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OriginError::Cancelled {
                    origin,
                    label: query.label.to_string(),
                });
            }
            result = fetch => match result {
                Err(_) => {
                    return Err(OriginError::Timeout {
                        origin,
                        label: query.label.to_string(),
                        after: self.query_timeout,
                    });
                }
                Ok(rows) => rows
                    .map_err(|e| OriginError::from_sqlx(origin, query.label, e, self.query_timeout))?,
            },
        };

        debug!(
            origin = %origin,
            label = query.label,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "origin query finished"
        );

        rows.iter()
            .map(|row| decode_row(origin, row, self.naive_zone))
            .collect()
    }
}

fn decode_row(
    origin: OriginDb,
    row: &PgRow,
    naive_zone: NaiveTimestampZone,
) -> std::result::Result<SqlRow, OriginError> {
    let mut decoded = SqlRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info().name(), naive_zone).map_err(|e| {
            OriginError::Decode {
                origin,
                column: column.name().to_string(),
                message: e.to_string(),
            }
        })?;
        decoded.push(column.name(), value.unwrap_or(SqlValue::Null));
    }
    Ok(decoded)
}

fn decode_column(
    row: &PgRow,
    idx: usize,
    type_name: &str,
    naive_zone: NaiveTimestampZone,
) -> std::result::Result<Option<SqlValue>, sqlx::Error> {
    Ok(match type_name {
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx)?.map(SqlValue::Date),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(SqlValue::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| SqlValue::Timestamp(naive_zone.to_utc(t))),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|n| SqlValue::Int(n.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|n| SqlValue::Int(n.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::Int),
        _ => row.try_get::<Option<String>, _>(idx)?.map(SqlValue::Text),
    })
}
