//! Interface de terminal do stagewatch: spinner e tabelas coloridas.
//!
//! Usa as crates `indicatif` para o spinner enquanto as consultas rodam e
//! `console` para colorir cada status. O [`StatusBoard`] imprime os
//! resultados de workflow e de reporting no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use stagewatch::state_machine::{ReportingLoaderResult, SnapshotType, WorkflowStatus, WorkflowStatusResult};

/// Quadro de status no terminal.
///
/// Verde para concluído, vermelho para falha, amarelo para em andamento
/// e cinza para pendente.
pub struct StatusBoard {
    // Spinner do indicatif exibido durante as consultas.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
    bold: Style,
}

impl StatusBoard {
    /// Inicia o spinner com a mensagem informada.
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }

    /// Remove o spinner antes de imprimir a saída.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    fn style_for(&self, status: WorkflowStatus) -> &Style {
        match status {
            WorkflowStatus::Completed => &self.green,
            WorkflowStatus::Failed => &self.red,
            WorkflowStatus::InProgress | WorkflowStatus::LongRunning => &self.yellow,
            WorkflowStatus::Pending => &self.dim,
        }
    }

    /// Imprime uma linha por estágio, agrupada por cliente/região.
    pub fn print_workflows(&self, results: &[WorkflowStatusResult]) {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for result in results {
            let pair = (result.client.as_str(), result.region.as_str());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }

        for (client, region) in pairs {
            println!();
            println!("{}", self.bold.apply_to(format!("─── {client} / {region} ───")));
            for result in results
                .iter()
                .filter(|r| r.client == client && r.region == region)
            {
                let status = self.style_for(result.status);
                let counts = match (result.positions_count, result.taxlots_count, result.total_count) {
                    (Some(p), Some(t), Some(total)) => format!("  pos {p}/{total} tax {t}/{total}"),
                    _ => String::new(),
                };
                let updated = result
                    .last_updated
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:<16} {:<14} {:<16} {}{}",
                    result.workflow_type,
                    status.apply_to(result.status.as_str()),
                    updated,
                    result.subjects_found.join(","),
                    counts,
                );
                if let Some(diagnostic) = &result.diagnostic {
                    println!("  {:<16} {}", "", self.dim.apply_to(diagnostic));
                }
            }
        }
    }

    /// Imprime as cargas de reporting de cada snapshot.
    pub fn print_reporting(&self, snapshots: &[(SnapshotType, Vec<ReportingLoaderResult>)]) {
        for (snapshot, results) in snapshots {
            let done = results
                .iter()
                .filter(|r| r.status == WorkflowStatus::Completed)
                .count();
            println!();
            println!(
                "{}",
                self.bold
                    .apply_to(format!("─── {snapshot} reporting ({done}/{}) ───", results.len()))
            );
            for result in results {
                let updated = result
                    .last_updated
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:<52} {:<12} {}",
                    result.marker_type,
                    self.style_for(result.status).apply_to(result.status.as_str()),
                    updated,
                );
            }
        }
    }
}
