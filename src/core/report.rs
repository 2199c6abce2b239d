//! Per-run diagnostics: `diagnostics.json`, `summary.csv` and the stdout table.

use crate::domain::model::{Binding, Diagnostic, Severity, Verdict, VerdictStatus};
use crate::utils::error::{PairgenError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";
pub const SUMMARY_FILE: &str = "summary.csv";

#[derive(Debug, Clone, Serialize)]
pub struct AppReport {
    pub app_id: String,
    #[serde(skip)]
    pub app_number: u32,
    pub verdict: VerdictStatus,
    pub errors: usize,
    pub warnings: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub binding: Binding,
    pub backend_template: Option<String>,
    pub frontend_template: Option<String>,
    pub instantiated: bool,
    pub outputs: Vec<String>,
    /// Pair-level failure that stopped instantiation.
    pub error: Option<String>,
}

impl AppReport {
    pub fn new(app_id: impl Into<String>, app_number: u32, binding: Binding) -> Self {
        Self {
            app_id: app_id.into(),
            app_number,
            verdict: VerdictStatus::Errors,
            errors: 0,
            warnings: 0,
            diagnostics: Vec::new(),
            binding,
            backend_template: None,
            frontend_template: None,
            instantiated: false,
            outputs: Vec::new(),
            error: None,
        }
    }

    /// Keeps every diagnostic, including the informational ones a `Consistent`
    /// verdict does not carry.
    pub fn with_verdict(mut self, verdict: &Verdict, diagnostics: Vec<Diagnostic>) -> Self {
        self.verdict = verdict.status();
        self.errors = count(&diagnostics, Severity::Error);
        self.warnings = count(&diagnostics, Severity::Warning);
        self.diagnostics = diagnostics;
        self
    }

    pub fn fail(mut self, error: impl ToString) -> Self {
        self.instantiated = false;
        self.error = Some(error.to_string());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.instantiated && self.error.is_none()
    }
}

fn count(diagnostics: &[Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub apps: usize,
    pub consistent: usize,
    pub warnings: usize,
    pub errors: usize,
    pub instantiated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub totals: Totals,
    pub apps: BTreeMap<String, AppReport>,
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    app_id: &'a str,
    verdict: VerdictStatus,
    errors: usize,
    warnings: usize,
    backend_port: Option<u16>,
    frontend_port: Option<u16>,
    instantiated: bool,
}

impl BatchReport {
    pub fn new(reports: Vec<AppReport>, dry_run: bool) -> Self {
        let mut totals = Totals {
            apps: reports.len(),
            ..Totals::default()
        };
        for report in &reports {
            match report.verdict {
                VerdictStatus::Consistent => totals.consistent += 1,
                VerdictStatus::Warnings => totals.warnings += 1,
                VerdictStatus::Errors => totals.errors += 1,
            }
            if report.succeeded() {
                totals.instantiated += 1;
            } else {
                totals.failed += 1;
            }
        }

        Self {
            generated_at: Utc::now(),
            dry_run,
            totals,
            apps: reports.into_iter().map(|r| (r.app_id.clone(), r)).collect(),
        }
    }

    /// Reports ordered by app number rather than by id string.
    pub fn ordered(&self) -> Vec<&AppReport> {
        let mut reports: Vec<&AppReport> = self.apps.values().collect();
        reports.sort_by_key(|r| r.app_number);
        reports
    }

    /// 0: every pair succeeded. 2: partial success. 1: nothing was instantiated.
    pub fn exit_code(&self) -> i32 {
        match (self.totals.failed, self.totals.instantiated) {
            (0, _) => 0,
            (_, 0) => 1,
            _ => 2,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for report in self.ordered() {
            writer.serialize(SummaryRow {
                app_id: &report.app_id,
                verdict: report.verdict,
                errors: report.errors,
                warnings: report.warnings,
                backend_port: report.binding.backend_port(),
                frontend_port: report.binding.frontend_port(),
                instantiated: report.instantiated,
            })?;
        }
        writer.into_inner().map_err(|e| {
            PairgenError::IoError(std::io::Error::new(e.error().kind(), e.to_string()))
        })
    }

    pub fn summary_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<10} {:<11} {:>6} {:>8} {:>8} {:>8}  {}",
            "APP", "VERDICT", "ERRORS", "WARNINGS", "BACKEND", "FRONTEND", "RESULT"
        );
        for report in self.ordered() {
            let result = match (&report.error, self.dry_run) {
                (Some(error), _) => format!("skipped: {}", error),
                (None, true) => "ready (dry run)".to_string(),
                (None, false) => format!("written: {}", report.outputs.join(", ")),
            };
            let _ = writeln!(
                out,
                "{:<10} {:<11} {:>6} {:>8} {:>8} {:>8}  {}",
                report.app_id,
                report.verdict,
                report.errors,
                report.warnings,
                port_cell(report.binding.backend_port()),
                port_cell(report.binding.frontend_port()),
                result
            );
        }
        let _ = writeln!(
            out,
            "{} app(s): {} consistent, {} with warnings, {} with errors; {} instantiated",
            self.totals.apps,
            self.totals.consistent,
            self.totals.warnings,
            self.totals.errors,
            self.totals.instantiated
        );
        out
    }
}

fn port_cell(port: Option<u16>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}
