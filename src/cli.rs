//! Interface de linha de comando do stagewatch baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (status, reporting,
//! sod-date) e flags globais (--config, --verbose).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use stagewatch::normalize::parse_business_date;

/// stagewatch: reconciliação de conclusão de workflows por estágio.
#[derive(Debug, Parser)]
#[command(name = "stagewatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: ./stagewatch.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Par cliente/região informado como `CLIENTE:REGIAO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairArg {
    pub client: String,
    pub region: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Avalia todos os estágios do catálogo para os pares informados.
    Status {
        /// Data de negócio (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        /// Par cliente/região; pode ser repetido.
        #[arg(long = "pair", value_parser = parse_pair, required = true)]
        pairs: Vec<PairArg>,

        /// Imprime o resultado em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Mostra as cargas da camada de reporting.
    Reporting {
        /// Data de negócio (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        #[arg(long)]
        client: String,

        #[arg(long)]
        region: String,

        /// Snapshot (EODPX, EOD, AOD, SOD). Todos quando omitido.
        #[arg(long)]
        snapshot: Option<String>,

        /// Imprime o resultado em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Calcula a data SOD (próximo dia útil) para uma data de negócio.
    SodDate {
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },
}

// Validação estrita: formatos alternativos de data são rejeitados.
fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_business_date(raw).map_err(|e| e.to_string())
}

fn parse_pair(raw: &str) -> Result<PairArg, String> {
    match raw.split_once(':') {
        Some((client, region)) if !client.trim().is_empty() && !region.trim().is_empty() => {
            Ok(PairArg {
                client: client.to_string(),
                region: region.to_string(),
            })
        }
        _ => Err(format!("expected CLIENT:REGION, got `{raw}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_status_subcommand() {
        let cli = Cli::parse_from([
            "stagewatch",
            "status",
            "--date",
            "2024-03-04",
            "--pair",
            "ACME:Amer",
            "--pair",
            "BETA:EMEA",
        ]);
        match cli.command {
            Command::Status { date, pairs, json } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].region, "Amer");
                assert!(!json);
            }
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "stagewatch",
            "--config",
            "/tmp/stagewatch.toml",
            "--verbose",
            "sod-date",
            "--date",
            "2024-03-09",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/stagewatch.toml")));
        assert!(matches!(cli.command, Command::SodDate { .. }));
    }

    #[test]
    fn cli_parses_reporting_subcommand() {
        let cli = Cli::parse_from([
            "stagewatch",
            "reporting",
            "--date",
            "2024-03-04",
            "--client",
            "ACME",
            "--region",
            "AMER",
            "--snapshot",
            "eod",
            "--json",
        ]);
        match cli.command {
            Command::Reporting {
                snapshot, json, ..
            } => {
                assert_eq!(snapshot.as_deref(), Some("eod"));
                assert!(json);
            }
            _ => panic!("expected Reporting command"),
        }
    }

    #[test]
    fn cli_rejects_loose_dates_and_pairs() {
        assert!(
            Cli::try_parse_from(["stagewatch", "sod-date", "--date", "04/03/2024"]).is_err()
        );
        assert!(
            Cli::try_parse_from([
                "stagewatch",
                "status",
                "--date",
                "2024-03-04",
                "--pair",
                "ACME"
            ])
            .is_err()
        );
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
