//! Run report: per-instrument outcomes aggregated once per run, rendered to
//! JSON, plain text and HTML.

use crate::ui;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::Cell;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const LATEST_MARKER: &str = "latest.txt";

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentOutcome {
    pub name: String,
    pub symbol: String,
    pub success: bool,
    pub records: usize,
    pub missing: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub instruments: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_records: usize,
    pub total_missing: usize,
}

/// The finished aggregate for one run. Immutable once built; the renderers
/// below are views over the same data.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub instruments: Vec<InstrumentOutcome>,
    pub summary: RunSummary,
    pub errors: Vec<String>,
}

/// Accumulates outcomes while the assembler walks the instrument list.
#[derive(Debug, Default)]
pub struct RunReportBuilder {
    outcomes: Vec<InstrumentOutcome>,
}

impl RunReportBuilder {
    pub fn new() -> Self {
        RunReportBuilder::default()
    }

    pub fn record(&mut self, outcome: InstrumentOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(
        self,
        generated_at: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RunReport {
        let succeeded = self.outcomes.iter().filter(|o| o.success).count();
        // Failed instruments keep their persisted history in the table, so
        // only successful fetches count toward total_records.
        let total_records = self
            .outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.records)
            .sum();
        let total_missing = self.outcomes.iter().map(|o| o.missing).sum();
        let errors = self
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {e}", o.name)))
            .collect();

        RunReport {
            generated_at: generated_at.into(),
            start_date,
            end_date,
            summary: RunSummary {
                instruments: self.outcomes.len(),
                succeeded,
                failed: self.outcomes.len() - succeeded,
                total_records,
                total_missing,
            },
            instruments: self.outcomes,
            errors,
        }
    }
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    /// Plain-text rendering, also used as the mail body.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Daily close report for {}", self.end_date);
        let _ = writeln!(out, "Generated: {}", self.generated_at);
        let _ = writeln!(out, "Date range: {} to {}", self.start_date, self.end_date);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Instruments: {} ({} succeeded, {} failed)",
            self.summary.instruments, self.summary.succeeded, self.summary.failed
        );
        let _ = writeln!(
            out,
            "Records: {} present, {} missing",
            self.summary.total_records, self.summary.total_missing
        );
        let _ = writeln!(out);

        for outcome in &self.instruments {
            let status = if outcome.success { "OK    " } else { "FAILED" };
            let _ = write!(
                out,
                "  {status} {:<32} records={:<6} missing={}",
                outcome.name, outcome.records, outcome.missing
            );
            if let Some(error) = &outcome.error {
                let _ = write!(out, "  error={error}");
            }
            let _ = writeln!(out);
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Errors:");
            for error in &self.errors {
                let _ = writeln!(out, "  - {error}");
            }
        }

        out
    }

    /// Styled HTML rendering of the same aggregate.
    pub fn render_html(&self) -> String {
        let mut rows = String::new();
        for outcome in &self.instruments {
            let (status, class) = if outcome.success {
                ("OK", "ok")
            } else {
                ("FAILED", "failed")
            };
            let error = outcome.error.as_deref().unwrap_or("");
            let _ = write!(
                rows,
                "<tr><td>{}</td><td class=\"{class}\">{status}</td>\
                 <td class=\"num\">{}</td><td class=\"num\">{}</td><td>{}</td></tr>",
                html_escape(&outcome.name),
                outcome.records,
                outcome.missing,
                html_escape(error),
            );
        }

        let mut errors = String::new();
        if !self.errors.is_empty() {
            errors.push_str("<h2>Errors</h2><ul>");
            for error in &self.errors {
                let _ = write!(errors, "<li>{}</li>", html_escape(error));
            }
            errors.push_str("</ul>");
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Daily close report {end}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; background-color: #f5f5f5; }}
        .container {{ max-width: 800px; margin: 0 auto; background: white; padding: 30px; border-radius: 10px; box-shadow: 0 0 10px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; border-bottom: 2px solid #007bff; padding-bottom: 10px; }}
        table {{ border-collapse: collapse; width: 100%; margin-top: 20px; }}
        th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
        th {{ background: #f8f9fa; }}
        td.num {{ text-align: right; }}
        td.ok {{ color: #28a745; font-weight: bold; }}
        td.failed {{ color: #dc3545; font-weight: bold; }}
        .summary {{ margin-top: 10px; color: #555; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>📊 Daily close report {end}</h1>
        <p class="summary">Generated: {generated}<br>
        Date range: {start} to {end}<br>
        Instruments: {instruments} ({succeeded} succeeded, {failed} failed)<br>
        Records: {records} present, {missing} missing</p>
        <table>
            <tr><th>Instrument</th><th>Status</th><th>Records</th><th>Missing</th><th>Error</th></tr>
            {rows}
        </table>
        {errors}
    </div>
</body>
</html>
"#,
            end = self.end_date,
            start = self.start_date,
            generated = html_escape(&self.generated_at),
            instruments = self.summary.instruments,
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            records = self.summary.total_records,
            missing = self.summary.total_missing,
            rows = rows,
            errors = errors,
        )
    }

    /// Console rendering with the standard table styling.
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Instrument"),
            ui::header_cell("Status"),
            ui::header_cell("Records"),
            ui::header_cell("Missing"),
            ui::header_cell("Error"),
        ]);

        for outcome in &self.instruments {
            table.add_row(vec![
                Cell::new(&outcome.name),
                ui::status_cell(outcome.success),
                ui::count_cell(outcome.records),
                ui::count_cell(outcome.missing),
                Cell::new(outcome.error.as_deref().unwrap_or("")),
            ]);
        }

        let summary = format!(
            "{} of {} instruments succeeded, {} records, {} missing",
            self.summary.succeeded,
            self.summary.instruments,
            self.summary.total_records,
            self.summary.total_missing
        );

        format!("{table}\n{summary}")
    }

    /// Writes the run-dated artifact set and refreshes the latest marker.
    pub fn write_artifacts(&self, dir: &Path, run_date: NaiveDate) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let stem = format!("report_{run_date}");
        let json_path = dir.join(format!("{stem}.json"));
        fs::write(&json_path, self.to_json()?)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;

        let text_path = dir.join(format!("{stem}.txt"));
        fs::write(&text_path, self.render_text())
            .with_context(|| format!("Failed to write {}", text_path.display()))?;

        let html_path = dir.join(format!("{stem}.html"));
        fs::write(&html_path, self.render_html())
            .with_context(|| format!("Failed to write {}", html_path.display()))?;

        let marker_path = dir.join(LATEST_MARKER);
        fs::write(&marker_path, format!("{run_date}\n"))
            .with_context(|| format!("Failed to write {}", marker_path.display()))?;

        debug!("Wrote report artifacts to {}", dir.display());
        Ok(())
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn outcome(
        name: &str,
        success: bool,
        records: usize,
        missing: usize,
        error: Option<&str>,
    ) -> InstrumentOutcome {
        InstrumentOutcome {
            name: name.to_string(),
            symbol: format!("{name}-SYM"),
            success,
            records,
            missing,
            error: error.map(str::to_string),
        }
    }

    fn sample_report() -> RunReport {
        let mut builder = RunReportBuilder::new();
        builder.record(outcome("DAX", true, 200, 16, None));
        builder.record(outcome("Bitcoin", true, 216, 0, None));
        builder.record(outcome(
            "Tesla",
            false,
            50,
            166,
            Some("rate limited after 6 attempts"),
        ));
        builder.finish(
            "2025-08-04 18:00:00 CEST",
            date("2025-01-01"),
            date("2025-08-04"),
        )
    }

    #[test]
    fn test_summary_arithmetic() {
        let report = sample_report();
        assert_eq!(report.summary.instruments, 3);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
        // Only successful instruments count toward total_records; missing
        // counts include the failed one.
        assert_eq!(report.summary.total_records, 200 + 216);
        assert_eq!(report.summary.total_missing, 16 + 166);
    }

    #[test]
    fn test_errors_carry_instrument_name() {
        let report = sample_report();
        assert_eq!(
            report.errors,
            vec!["Tesla: rate limited after 6 attempts".to_string()]
        );
    }

    #[test]
    fn test_json_shape() {
        let report = sample_report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["summary"]["succeeded"], 2);
        assert_eq!(value["instruments"][0]["name"], "DAX");
        assert_eq!(value["instruments"][2]["success"], false);
        assert_eq!(
            value["instruments"][2]["error"],
            "rate limited after 6 attempts"
        );
        // Successful outcomes serialize without an error field.
        assert!(value["instruments"][0].get("error").is_none());
        assert_eq!(value["start_date"], "2025-01-01");
    }

    #[test]
    fn test_text_rendering() {
        let text = sample_report().render_text();
        assert!(text.contains("Daily close report for 2025-08-04"));
        assert!(text.contains("Instruments: 3 (2 succeeded, 1 failed)"));
        assert!(text.contains("FAILED Tesla"));
        assert!(text.contains("- Tesla: rate limited after 6 attempts"));
    }

    #[test]
    fn test_html_rendering_escapes_names() {
        let mut builder = RunReportBuilder::new();
        builder.record(outcome("The US S&P 500", true, 10, 0, None));
        let report = builder.finish("now", date("2025-01-01"), date("2025-01-02"));

        let html = report.render_html();
        assert!(html.contains("The US S&amp;P 500"));
        assert!(html.contains("<title>Daily close report 2025-01-02</title>"));
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        report.write_artifacts(dir.path(), date("2025-08-04")).unwrap();

        for extension in ["json", "txt", "html"] {
            let path = dir.path().join(format!("report_2025-08-04.{extension}"));
            assert!(path.exists(), "missing {}", path.display());
        }
        let marker = std::fs::read_to_string(dir.path().join(LATEST_MARKER)).unwrap();
        assert_eq!(marker, "2025-08-04\n");
    }

    #[test]
    fn test_empty_run_report() {
        let report =
            RunReportBuilder::new().finish("now", date("2025-01-01"), date("2025-01-02"));
        assert_eq!(report.summary.instruments, 0);
        assert_eq!(report.summary.total_records, 0);
        assert!(report.errors.is_empty());
    }
}
