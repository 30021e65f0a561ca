//! Interface de terminal do pulse: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`StageProgress`] acompanha visualmente uma
//! etapa em execução e o [`Printer`] exibe o resultado de cada comando,
//! como resumo colorido ou como JSON.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::classifier::ClassifyReport;
use crate::collector::CollectReport;
use crate::health::{HealthSnapshot, HealthVerdict};
use crate::pipeline::{ClearReport, PipelineReport};

/// Indicador visual de progresso para uma etapa em execução.
pub struct StageProgress {
    pb: ProgressBar,
}

impl StageProgress {
    /// Inicia o spinner com a descrição da etapa. Com `hidden` nada é
    /// desenhado, para não poluir a saída JSON.
    pub fn start(description: &str, hidden: bool) -> Self {
        if hidden {
            return Self {
                pb: ProgressBar::hidden(),
            };
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Remove o spinner antes de imprimir o resultado.
    pub fn finish(self) {
        self.pb.finish_and_clear();
    }
}

/// Exibe os resultados dos comandos.
///
/// Sucesso é mostrado em verde, falha em vermelho e avisos em amarelo.
pub struct Printer {
    json: bool,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    pub fn pipeline(&self, report: &PipelineReport) {
        self.emit(report, || self.pipeline_lines(report));
    }

    pub fn scrape(&self, report: &CollectReport) {
        self.emit(report, || self.scrape_lines(report));
    }

    pub fn analyze(&self, report: &ClassifyReport) {
        self.emit(report, || self.analyze_lines(report));
    }

    pub fn clear(&self, report: &ClearReport) {
        self.emit(report, || vec![self.status_line(report.success, &report.message)]);
    }

    pub fn health(&self, snapshot: &HealthSnapshot) {
        self.emit(snapshot, || self.health_lines(snapshot));
    }

    fn emit<T: Serialize>(&self, value: &T, lines: impl FnOnce() -> Vec<String>) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_default()
            );
        } else {
            for line in lines() {
                println!("{line}");
            }
        }
    }

    fn status_line(&self, success: bool, text: &str) -> String {
        if success {
            format!("  {} {text}", self.green.apply_to("✓"))
        } else {
            format!("  {} {text}", self.red.apply_to("✗"))
        }
    }

    fn warning_line(&self, text: &str) -> String {
        format!("  {} {text}", self.yellow.apply_to("!"))
    }

    fn pipeline_lines(&self, report: &PipelineReport) -> Vec<String> {
        let mut lines = vec![self.status_line(report.success, &report.summary)];
        if let Some(error) = &report.error {
            lines.push(self.status_line(false, error));
        }
        lines.extend(report.warnings.iter().map(|w| self.warning_line(w)));
        lines.extend(
            report
                .scrape
                .errors
                .iter()
                .map(|e| format!("    {}", self.dim.apply_to(e))),
        );
        lines
    }

    fn scrape_lines(&self, report: &CollectReport) -> Vec<String> {
        let headline = match (&report.error, &report.message) {
            (Some(error), _) => error.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => format!("Scraped {} posts", report.scraped),
        };
        let mut lines = vec![self.status_line(report.success, &headline)];
        lines.extend(report.warning.iter().map(|w| self.warning_line(w)));
        lines.extend(
            report
                .errors
                .iter()
                .map(|e| format!("    {}", self.dim.apply_to(e))),
        );
        lines
    }

    fn analyze_lines(&self, report: &ClassifyReport) -> Vec<String> {
        if let Some(error) = &report.error {
            return vec![self.status_line(false, error)];
        }
        if let Some(message) = &report.message {
            return vec![self.status_line(true, message)];
        }
        let mut lines = vec![self.status_line(
            true,
            &format!(
                "Analyzed {} of {} {} records",
                report.analyzed, report.total, report.target
            ),
        )];
        if report.failed > 0 {
            lines.push(self.warning_line(&format!("{} record(s) failed", report.failed)));
        }
        lines
    }

    fn health_lines(&self, snapshot: &HealthSnapshot) -> Vec<String> {
        let verdict_style = match snapshot.status {
            HealthVerdict::Healthy => &self.green,
            HealthVerdict::Degraded => &self.red,
            HealthVerdict::Processing | HealthVerdict::Idle => &self.yellow,
        };
        let counts = &snapshot.counts;
        let mut lines = vec![
            format!("  Status: {}", verdict_style.apply_to(snapshot.status)),
            format!(
                "  Records: {} total ({} pending, {} processing, {} completed, {} failed)",
                snapshot.total, counts.pending, counts.processing, counts.completed, counts.failed
            ),
        ];
        if let (Some(success), Some(failure)) = (snapshot.success_rate, snapshot.failure_rate) {
            lines.push(format!(
                "  Success rate: {success:.1}%, failure rate: {failure:.1}%"
            ));
        }
        let last = snapshot
            .last_analyzed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!("  Last analysis: {}", self.dim.apply_to(last)));
        lines
    }
}
