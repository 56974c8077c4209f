//! Run outcomes and their presentation
//!
//! Provides table and JSON formatting with colors.

use colored::*;
use serde::Serialize;
use standrig_core::{Criterion, Result};
use std::fmt;
use tabled::{settings::Style, Table, Tabled};

use crate::orchestrator::Phase;

/// Result of one criterion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Pass { measured: f64 },
    Fail { measured: f64 },
    /// The referenced PSU is disabled in this run
    Skipped,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail { .. })
    }

    /// Measured value, absent for skipped criteria
    pub fn measured(&self) -> Option<f64> {
        match self {
            Verdict::Pass { measured } | Verdict::Fail { measured } => Some(*measured),
            Verdict::Skipped => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass { .. } => f.write_str("PASS"),
            Verdict::Fail { .. } => f.write_str("FAIL"),
            Verdict::Skipped => f.write_str("SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionOutcome {
    /// Position in the criteria list
    pub index: usize,
    pub criterion: Criterion,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Result of switching one PSU off during Disable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisableOutcome {
    pub psu_index: usize,
    pub turned_off: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a finished run observed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestReport {
    pub outcomes: Vec<CriterionOutcome>,
    pub disabled: Vec<DisableOutcome>,
}

impl TestReport {
    /// True iff no criterion failed; skipped criteria do not count against the run
    pub fn passed(&self) -> bool {
        !self.outcomes.iter().any(|o| o.verdict.is_fail())
    }

    pub fn count(&self, predicate: impl Fn(&Verdict) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.verdict)).count()
    }
}

/// Progress notifications sent to the operator while a run executes
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    PhaseStarted(Phase),
    /// A PSU answered the identity handshake
    Connected {
        psu_index: usize,
        endpoint: String,
        idn: String,
        version: String,
    },
    /// A PSU is disabled in the settings and takes no part in the run
    PsuSkipped { psu_index: usize },
    Configured {
        psu_index: usize,
        mode: &'static str,
        voltage: f64,
        current: f64,
    },
    OutputEnabled { psu_index: usize },
    Criterion(CriterionOutcome),
    Disabled(DisableOutcome),
    /// The run stopped early; Disable follows
    Aborted { phase: Phase, reason: String },
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Format a finished run
pub fn format_report(report: &TestReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct CriterionRow {
                #[tabled(rename = "#")]
                index: usize,
                #[tabled(rename = "Criterion")]
                kind: String,
                #[tabled(rename = "PSU")]
                psu: usize,
                #[tabled(rename = "Check")]
                check: String,
                #[tabled(rename = "Measured")]
                measured: String,
                #[tabled(rename = "Result")]
                verdict: String,
            }

            let rows: Vec<CriterionRow> = report
                .outcomes
                .iter()
                .map(|o| CriterionRow {
                    index: o.index,
                    kind: o.criterion.kind.to_string(),
                    psu: o.criterion.psu_index,
                    check: format!(
                        "{} {} {}",
                        o.criterion.inequality,
                        o.criterion.threshold,
                        o.criterion.unit()
                    ),
                    measured: o
                        .verdict
                        .measured()
                        .map(|m| format!("{} {}", m, o.criterion.unit()))
                        .unwrap_or_else(|| "-".to_string()),
                    verdict: paint_verdict(&o.verdict),
                })
                .collect();

            let mut output = String::new();
            output.push_str(&"Criteria:".bold().to_string());
            output.push('\n');
            if rows.is_empty() {
                output.push_str(&"No criteria evaluated".dimmed().to_string());
            } else {
                output.push_str(&Table::new(rows).with(Style::rounded()).to_string());
            }
            output.push('\n');

            let off = report.disabled.iter().filter(|d| d.turned_off).count();
            output.push_str(&format!(
                "PSUs turned off: {}/{}",
                off,
                report.disabled.len()
            ));
            output.push('\n');

            let overall = if report.passed() {
                "PASS".green().bold()
            } else {
                "FAIL".red().bold()
            };
            output.push_str(&format!(
                "Overall: {} ({} passed, {} failed, {} skipped)",
                overall,
                report.count(Verdict::is_pass),
                report.count(Verdict::is_fail),
                report.count(|v| *v == Verdict::Skipped)
            ));

            Ok(output)
        }
    }
}

/// Colored verdict label
pub fn paint_verdict(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Pass { .. } => verdict.to_string().green().to_string(),
        Verdict::Fail { .. } => verdict.to_string().red().to_string(),
        Verdict::Skipped => verdict.to_string().yellow().to_string(),
    }
}
