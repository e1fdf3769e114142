//! Tipos de dados trocados com os stores de origem.
//!
//! [`SqlQuery`] carrega o texto da consulta e os parâmetros ligados;
//! [`SqlRow`] é a linha devolvida, como mapeamento ordenado coluna → valor.
//! [`MarkerRow`] e [`OriginMessageId`] são os esquemas fixos preenchidos a
//! partir dessas linhas, com validação dos campos obrigatórios.

use std::fmt;

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatusError};
use crate::normalize::{normalize_date, CanonicalKey};
use crate::state_machine::SnapshotType;

/// As duas conexões lógicas consultadas pelo núcleo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginDb {
    /// Store de log de transações ("o que foi submetido").
    Atls,
    /// Store de marcadores/eventos ("o que terminou").
    Adm,
}

impl fmt::Display for OriginDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginDb::Atls => write!(f, "ATLS"),
            OriginDb::Adm => write!(f, "ADM"),
        }
    }
}

/// Um parâmetro ligado a um placeholder `$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Date(NaiveDate),
    TextArray(Vec<String>),
}

/// Consulta parametrizada. Nenhum valor é interpolado no texto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    /// Rótulo curto usado em logs e erros (ex.: `combined_markers`).
    pub label: &'static str,
    pub text: String,
    pub params: Vec<SqlParam>,
}

/// Valor de uma coluna já decodificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

/// Linha devolvida por um store, com as colunas na ordem do `SELECT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acrescenta a coluna, ou substitui o valor se o nome já existir.
    pub fn push(&mut self, name: impl Into<String>, value: SqlValue) {
        let name = name.into();
        match self.columns.iter_mut().find(|(col, _)| *col == name) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((name, value)),
        }
    }

    /// Variante encadeável de [`push`](SqlRow::push).
    pub fn with(mut self, name: impl Into<String>, value: SqlValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    /// Texto não vazio; ausência ou NULL viram `MalformedInput`.
    pub fn required_text(&self, name: &str) -> Result<String> {
        self.optional_text(name)?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| StatusError::malformed(format!("missing required column `{name}`")))
    }

    pub fn optional_text(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(s)) => Ok(Some(s.clone())),
            Some(SqlValue::Int(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(StatusError::malformed(format!(
                "column `{name}` is not text: {other:?}"
            ))),
        }
    }

    pub fn required_date(&self, name: &str) -> Result<NaiveDate> {
        match self.get(name) {
            Some(SqlValue::Date(d)) => Ok(*d),
            Some(SqlValue::Timestamp(t)) => Ok(t.date_naive()),
            Some(SqlValue::Text(s)) => {
                let normalized = normalize_date(s.as_str());
                NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").map_err(|_| {
                    StatusError::malformed(format!("column `{name}` is not a date: `{s}`"))
                })
            }
            _ => Err(StatusError::malformed(format!("missing required column `{name}`"))),
        }
    }

    pub fn required_timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        match self.get(name) {
            Some(SqlValue::Timestamp(t)) => Ok(*t),
            Some(SqlValue::Text(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| {
                    StatusError::malformed(format!("column `{name}` is not a timestamp: `{s}`"))
                }),
            _ => Err(StatusError::malformed(format!("missing required column `{name}`"))),
        }
    }
}

/// Fuso em que colunas `timestamp without time zone` foram gravadas.
///
/// Os stores gravam hora de parede; sem isso a idade dos eventos ficaria
/// deslocada pelo offset do host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum NaiveTimestampZone {
    /// Fuso local do host.
    #[default]
    Local,
    Utc,
    /// Deslocamento fixo, como `-05:00`.
    Fixed(FixedOffset),
}

impl NaiveTimestampZone {
    /// Aceita `local`, `utc` ou um deslocamento `±HH:MM`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            other => other.parse::<FixedOffset>().map(Self::Fixed).map_err(|_| {
                StatusError::Config(format!(
                    "invalid naive_timestamp_zone `{raw}` (expected local, utc or ±HH:MM)"
                ))
            }),
        }
    }

    pub fn to_utc(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Utc => naive.and_utc(),
            Self::Fixed(offset) => resolve_local(naive, offset),
            Self::Local => resolve_local(naive, &Local),
        }
    }
}

impl TryFrom<String> for NaiveTimestampZone {
    type Error = StatusError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

fn resolve_local<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match naive.and_local_timezone(tz.clone()) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        // Hora pulada pelo horário de verão: usa o offset vigente no instante.
        LocalResult::None => {
            let offset = tz.offset_from_utc_datetime(&naive).fix();
            (naive - offset).and_utc()
        }
    }
}

/// Resultado observado de um marcador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedStatus {
    Success,
    Failed,
}

impl ObservedStatus {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "success" => Ok(ObservedStatus::Success),
            "failed" => Ok(ObservedStatus::Failed),
            other => Err(StatusError::malformed(format!("unknown observed status `{other}`"))),
        }
    }
}

/// Qual das quatro fontes unidas produziu a linha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSource {
    Markers,
    FinalMarkers,
    ErrorLogs,
    ReportingLoaders,
}

impl MarkerSource {
    /// Valor literal emitido na coluna `source` da união.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerSource::Markers => "markers",
            MarkerSource::FinalMarkers => "final_markers",
            MarkerSource::ErrorLogs => "error_logs",
            MarkerSource::ReportingLoaders => "reporting_loaders_markers",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "markers" => Ok(MarkerSource::Markers),
            "final_markers" => Ok(MarkerSource::FinalMarkers),
            "error_logs" => Ok(MarkerSource::ErrorLogs),
            "reporting_loaders_markers" => Ok(MarkerSource::ReportingLoaders),
            other => Err(StatusError::malformed(format!("unknown marker source `{other}`"))),
        }
    }
}

/// Um evento observado no store de marcadores. Somente leitura.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRow {
    pub last_updated: DateTime<Utc>,
    pub client: String,
    pub region: String,
    pub snapshot_type: SnapshotType,
    pub marker_type: String,
    pub subject_area: Option<String>,
    pub original_message_id: Option<String>,
    pub business_date: NaiveDate,
    pub observed_status: ObservedStatus,
    pub source: MarkerSource,
}

impl MarkerRow {
    /// Preenche o esquema pelo nome das colunas da união combinada.
    pub fn from_sql_row(row: &SqlRow) -> Result<Self> {
        Ok(Self {
            last_updated: row.required_timestamp("last_updated")?,
            client: row.required_text("client_cd")?,
            region: row.required_text("processing_region_cd")?,
            snapshot_type: SnapshotType::parse(&row.required_text("snapshot_type_cd")?),
            marker_type: row.required_text("marker_type_cd")?,
            subject_area: row.optional_text("subject_area_cd")?,
            original_message_id: row.optional_text("original_message_id")?,
            business_date: row.required_date("business_dt")?,
            observed_status: ObservedStatus::parse(&row.required_text("status")?)?,
            source: MarkerSource::parse(&row.required_text("source")?)?,
        })
    }

    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::new(
            &self.client,
            &self.region,
            self.snapshot_type.as_str(),
            self.business_date,
        )
    }

    pub fn is_success(&self) -> bool {
        self.observed_status == ObservedStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.observed_status == ObservedStatus::Failed
    }

    pub fn subject_is(&self, subject: &str) -> bool {
        self.subject_area.as_deref() == Some(subject)
    }
}

/// Subsistema que produziu o identificador de transação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageOrigin {
    Accounting,
    Pricing,
}

impl MessageOrigin {
    /// Tabela ATLS que enumera os ids desta origem.
    pub fn table(&self) -> &'static str {
        match self {
            MessageOrigin::Accounting => "accounting_events",
            MessageOrigin::Pricing => "pricing_events",
        }
    }
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageOrigin::Accounting => write!(f, "ACCOUNTING"),
            MessageOrigin::Pricing => write!(f, "PRICING"),
        }
    }
}

/// Uma transação de negócio que deve produzir marcadores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMessageId {
    pub id: String,
    pub key: CanonicalKey,
    pub origin: MessageOrigin,
}

impl OriginMessageId {
    /// `None` quando a linha não traz id (essas linhas são ignoradas).
    pub fn from_sql_row(row: &SqlRow, origin: MessageOrigin) -> Result<Option<Self>> {
        let Some(id) = row
            .optional_text("original_message_id")?
            .filter(|id| !id.trim().is_empty())
        else {
            return Ok(None);
        };
        let key = CanonicalKey::new(
            &row.required_text("client_cd")?,
            &row.required_text("processing_region_cd")?,
            &row.required_text("snapshot_type_cd")?,
            row.required_date("business_dt")?,
        );
        Ok(Some(Self { id, key, origin }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn marker_sql_row() -> SqlRow {
        SqlRow::new()
            .with(
                "last_updated",
                SqlValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap()),
            )
            .with("client_cd", SqlValue::Text("acme".into()))
            .with("processing_region_cd", SqlValue::Text("Amer".into()))
            .with("snapshot_type_cd", SqlValue::Text("eod".into()))
            .with("marker_type_cd", SqlValue::Text("eodRegionSubjectAreaEnriched".into()))
            .with("subject_area_cd", SqlValue::Text("positions".into()))
            .with("original_message_id", SqlValue::Text("MSG1".into()))
            .with(
                "business_dt",
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()),
            )
            .with("status", SqlValue::Text("success".into()))
            .with("source", SqlValue::Text("markers".into()))
    }

    #[test]
    fn marker_row_from_sql_row() {
        let row = MarkerRow::from_sql_row(&marker_sql_row()).unwrap();
        assert_eq!(row.snapshot_type, SnapshotType::Eod);
        assert_eq!(row.observed_status, ObservedStatus::Success);
        assert_eq!(row.source, MarkerSource::Markers);
        assert!(row.subject_is("positions"));

        let key = row.key();
        assert_eq!(key.client, "ACME");
        assert_eq!(key.region, "AMER");
        assert_eq!(key.business_date, "2024-03-04");
    }

    #[test]
    fn missing_required_column_fails_fast() {
        let mut raw = marker_sql_row();
        raw.columns.retain(|(name, _)| name != "marker_type_cd");
        let err = MarkerRow::from_sql_row(&raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed input: missing required column `marker_type_cd`"
        );
    }

    #[test]
    fn null_subject_area_is_allowed() {
        let mut raw = marker_sql_row();
        raw.push("subject_area_cd", SqlValue::Null);
        let row = MarkerRow::from_sql_row(&raw).unwrap();
        assert_eq!(row.subject_area, None);
    }

    #[test]
    fn push_replaces_existing_column() {
        let mut raw = marker_sql_row();
        raw.push("marker_type_cd", SqlValue::Null);
        assert_eq!(raw.get("marker_type_cd"), Some(&SqlValue::Null));
        assert!(MarkerRow::from_sql_row(&raw).is_err());
    }

    #[test]
    fn naive_timestamps_follow_configured_zone() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        let utc = NaiveTimestampZone::parse("UTC").unwrap();
        assert_eq!(utc.to_utc(naive), Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());

        let new_york = NaiveTimestampZone::parse("-05:00").unwrap();
        assert_eq!(
            new_york.to_utc(naive),
            Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap()
        );

        let tokyo = NaiveTimestampZone::parse("+09:00").unwrap();
        assert_eq!(tokyo.to_utc(naive), Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap());

        let host = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(NaiveTimestampZone::default().to_utc(naive), host);
    }

    #[test]
    fn unknown_timestamp_zone_is_a_config_error() {
        let err = NaiveTimestampZone::parse("America/Sao_Paulo").unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));
    }

    #[test]
    fn text_business_date_is_normalized() {
        let row = SqlRow::new().with("business_dt", SqlValue::Text("2024-03-04T00:00:00".into()));
        assert_eq!(
            row.required_date("business_dt").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
    }

    #[test]
    fn origin_id_rows_without_id_are_skipped() {
        let raw = SqlRow::new()
            .with("client_cd", SqlValue::Text("ACME".into()))
            .with("processing_region_cd", SqlValue::Text("AMER".into()))
            .with("snapshot_type_cd", SqlValue::Text("AOD".into()))
            .with("business_dt", SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()))
            .with("original_message_id", SqlValue::Null);
        assert_eq!(
            OriginMessageId::from_sql_row(&raw, MessageOrigin::Accounting).unwrap(),
            None
        );
    }

    #[test]
    fn unknown_source_is_rejected() {
        assert!(MarkerSource::parse("audit_log").is_err());
        assert_eq!(
            MarkerSource::parse("reporting_loaders_markers").unwrap(),
            MarkerSource::ReportingLoaders
        );
    }
}
