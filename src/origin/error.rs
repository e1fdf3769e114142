//! Tipos de erro para os stores de origem (ATLS e ADM).
//!
//! Define [`OriginError`] com variantes para falha de consulta, timeout e
//! cancelamento. Usa `thiserror` para derivar `Display` e `Error`
//! automaticamente a partir dos atributos `#[error(...)]`.

use std::time::Duration;

use thiserror::Error;

use super::types::OriginDb;

/// SQLSTATE do Postgres para `canceling statement due to statement timeout`.
const PG_QUERY_CANCELED: &str = "57014";

/// Erros que podem ocorrer ao consultar um store de origem.
///
/// - [`Fetch`](OriginError::Fetch): conexão recusada, erro de SQL
/// - [`Timeout`](OriginError::Timeout): a consulta excedeu o teto configurado
/// - [`Cancelled`](OriginError::Cancelled): o chamador cancelou a consulta
/// - [`Decode`](OriginError::Decode): uma coluna não pôde ser decodificada
#[derive(Debug, Error)]
pub enum OriginError {
    /// Falha genérica de conectividade ou de execução da consulta.
    #[error("{origin} query `{label}` failed: {message}")]
    Fetch {
        origin: OriginDb,
        label: String,
        message: String,
    },

    /// A consulta excedeu o tempo máximo de execução.
    #[error("{origin} query `{label}` timed out after {}s", after.as_secs())]
    Timeout {
        origin: OriginDb,
        label: String,
        after: Duration,
    },

    /// O token de cancelamento foi acionado antes do fim da consulta.
    #[error("{origin} query `{label}` was cancelled")]
    Cancelled { origin: OriginDb, label: String },

    /// Valor de coluna com tipo inesperado.
    #[error("{origin} column `{column}` could not be decoded: {message}")]
    Decode {
        origin: OriginDb,
        column: String,
        message: String,
    },
}

impl OriginError {
    /// Converte um erro do `sqlx`, reconhecendo o timeout de statement do servidor.
    pub fn from_sqlx(origin: OriginDb, label: &str, err: sqlx::Error, after: Duration) -> Self {
        let canceled_by_server = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == PG_QUERY_CANCELED);

        if canceled_by_server {
            OriginError::Timeout {
                origin,
                label: label.to_string(),
                after,
            }
        } else {
            OriginError::Fetch {
                origin,
                label: label.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OriginError::Timeout { .. })
    }
}
