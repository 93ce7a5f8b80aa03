use crate::classify::FailureKind;
use crate::util::format_log_timestamp;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Files matched by the scan.
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub errors: Vec<ErrorEntry>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Set when the run stopped early on Ctrl-C.
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, output_name: impl Into<String>) {
        self.successes += 1;
        self.outputs.push(output_name.into());
    }

    pub fn record_failure(
        &mut self,
        name: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) {
        self.failures += 1;
        self.errors.push(ErrorEntry {
            name: name.into(),
            kind,
            message: message.into(),
        });
    }

    pub fn attempted(&self) -> usize {
        self.successes + self.failures
    }

    /// Percentage of attempted conversions that succeeded; 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            return 0.0;
        }
        self.successes as f64 / attempted as f64 * 100.0
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "CONVERSION SUMMARY:".to_string(),
            format!("Successes: {}", self.successes),
            format!("Failures: {}", self.failures),
            format!("Total processed: {}", self.total),
            format!("Success rate: {:.1}%", self.success_rate()),
        ];
        if self.interrupted {
            lines.push("Processing interrupted by user".to_string());
        }
        lines
    }
}

pub fn render_error_log(report: &BatchReport, now: OffsetDateTime) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "ERROR LOG - DOCLING CONVERSION");
    let _ = writeln!(s, "{}", "=".repeat(40));
    let _ = writeln!(s, "Date: {}", format_log_timestamp(now));
    let _ = writeln!(s, "Total files: {}", report.total);
    let _ = writeln!(s, "Successes: {}", report.successes);
    let _ = writeln!(s, "Failures: {}", report.failures);
    s.push('\n');
    for e in &report.errors {
        let _ = writeln!(s, "{}: {}", e.name, e.message);
    }
    s
}

pub fn write_error_log(path: &Path, report: &BatchReport, now: OffsetDateTime) -> Result<()> {
    std::fs::write(path, render_error_log(report, now))
        .with_context(|| format!("writing error log: {}", path.display()))
}
