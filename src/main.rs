mod cli;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use stagewatch::config::StagewatchConfig;
use stagewatch::normalize::calculate_sod_date;
use stagewatch::origin::PgOriginStore;
use stagewatch::state_machine::SnapshotType;
use stagewatch::WorkflowOrchestrator;
use ui::StatusBoard;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::SodDate { date } => {
            println!("{}", calculate_sod_date(date));
        }
        Command::Status { date, pairs, json } => {
            let orchestrator = connect(cli.config.as_deref())?;
            let pairs: Vec<(String, String)> =
                pairs.into_iter().map(|p| (p.client, p.region)).collect();

            let board = StatusBoard::start(&format!("Evaluating {} pair(s) for {date}", pairs.len()));
            let results = orchestrator.get_workflow_status(&pairs, date).await;
            board.finish();

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                board.print_workflows(&results);
            }
        }
        Command::Reporting {
            date,
            client,
            region,
            snapshot,
            json,
        } => {
            let orchestrator = connect(cli.config.as_deref())?;

            let board = StatusBoard::start(&format!("Fetching reporting loaders for {client}/{region}"));
            let snapshots = match snapshot {
                Some(raw) => {
                    let snapshot = SnapshotType::parse(&raw);
                    let results = orchestrator
                        .get_reporting_loaders_status(&client, &region, date, &snapshot)
                        .await;
                    vec![(snapshot, results)]
                }
                None => {
                    orchestrator
                        .get_all_reporting_loaders_status(&client, &region, date)
                        .await
                }
            };
            board.finish();

            if json {
                let by_snapshot: serde_json::Map<String, serde_json::Value> = snapshots
                    .iter()
                    .map(|(snapshot, results)| Ok((snapshot.to_string(), serde_json::to_value(results)?)))
                    .collect::<Result<_, serde_json::Error>>()?;
                println!("{}", serde_json::to_string_pretty(&by_snapshot)?);
            } else {
                board.print_reporting(&snapshots);
            }
        }
    }

    Ok(())
}

fn connect(config_path: Option<&std::path::Path>) -> Result<WorkflowOrchestrator<PgOriginStore>> {
    let config = StagewatchConfig::load(config_path).context("failed to load configuration")?;
    let store = PgOriginStore::connect(&config).context("failed to set up origin stores")?;
    Ok(WorkflowOrchestrator::from_config(store, &config))
}

// RUST_LOG tem precedência; sem ele, info (ou debug com --verbose).
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}
