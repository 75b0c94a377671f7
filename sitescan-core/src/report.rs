// Report rendering for analysis runs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sitescan_scanner::seo::{IssueSeverity, SeoIssue};
use sitescan_scanner::{AnalysisReport, FailureKind, ProbeOutcome, ReportEntry};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CSV_HEADER: &str =
    "order_index,url,lastmod,priority,status,latency_ms,title,meta_description,redirect_count";

/// Status cell for URLs a cancelled run never reached
pub const NOT_PROBED: &str = "not_probed";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Csv,
    Json,
    Text,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(ReportFormat::Csv),
            "json" => Some(ReportFormat::Json),
            "text" | "txt" => Some(ReportFormat::Text),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
            ReportFormat::Text => "txt",
        }
    }
}

/// One row of the tabular report, in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub order_index: usize,
    pub url: String,
    pub lastmod: Option<String>,
    pub priority: Option<f32>,
    /// HTTP status, or the failure kind when no usable status exists
    pub status: String,
    pub latency_ms: Option<u128>,
    pub title: String,
    pub meta_description: String,
    pub redirect_count: usize,
}

impl ReportRow {
    fn from_entry(entry: &ReportEntry) -> Self {
        let resolved = &entry.resolved;
        let mut row = ReportRow {
            order_index: resolved.order_index,
            url: resolved.url.clone(),
            lastmod: resolved.lastmod.clone(),
            priority: resolved.priority,
            status: NOT_PROBED.to_string(),
            latency_ms: None,
            title: String::new(),
            meta_description: String::new(),
            redirect_count: 0,
        };

        let Some(result) = &entry.result else {
            return row;
        };

        row.status = status_cell(&result.outcome);
        row.latency_ms = result.latency().map(|l| l.as_millis());
        row.redirect_count = result.redirect_count();
        if let Some(signals) = result.signals() {
            row.title = signals.title.clone();
            row.meta_description = signals.meta_description.clone();
        }
        row
    }

    fn csv_line(&self) -> String {
        let cells = [
            self.order_index.to_string(),
            escape_csv(&self.url),
            escape_csv(self.lastmod.as_deref().unwrap_or("")),
            self.priority.map(|p| p.to_string()).unwrap_or_default(),
            escape_csv(&self.status),
            self.latency_ms.map(|l| l.to_string()).unwrap_or_default(),
            escape_csv(&self.title),
            escape_csv(&self.meta_description),
            self.redirect_count.to_string(),
        ];
        cells.join(",")
    }
}

fn status_cell(outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Success { http_status, .. } => http_status.to_string(),
        ProbeOutcome::Failure {
            kind: FailureKind::HttpStatus,
            http_status: Some(status),
            ..
        } => status.to_string(),
        ProbeOutcome::Failure { kind, .. } => kind.as_str().to_string(),
    }
}

pub fn report_rows(report: &AnalysisReport) -> Vec<ReportRow> {
    report.entries.iter().map(ReportRow::from_entry).collect()
}

/// RFC 4180 quoting: fields holding separators, quotes or line breaks are quoted
pub fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn generate_csv_report(report: &AnalysisReport) -> String {
    let mut csv = String::with_capacity(64 * (report.entries.len() + 1));
    csv.push_str(CSV_HEADER);
    csv.push_str("\r\n");
    for row in report_rows(report) {
        csv.push_str(&row.csv_line());
        csv.push_str("\r\n");
    }
    csv
}

/// Issue messages of one severity across all successful HTML probes, most frequent first
pub fn frequent_issues(
    report: &AnalysisReport,
    severity: IssueSeverity,
    limit: usize,
) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for issue in report_issues(report) {
        if issue.severity == severity {
            *counts.entry(issue.message).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Totals of (errors, warnings) over every page's SEO issues
pub fn issue_totals(report: &AnalysisReport) -> (usize, usize) {
    report_issues(report).fold((0, 0), |(errors, warnings), issue| match issue.severity {
        IssueSeverity::Error => (errors + 1, warnings),
        IssueSeverity::Warning => (errors, warnings + 1),
    })
}

fn report_issues(report: &AnalysisReport) -> impl Iterator<Item = SeoIssue> + '_ {
    report
        .results()
        .filter_map(|r| r.signals())
        .flat_map(|signals| signals.issues())
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

pub fn generate_json_report(report: &AnalysisReport) -> Result<String, serde_json::Error> {
    let summary = &report.summary;
    let (total_errors, total_warnings) = issue_totals(report);

    let urls: Vec<serde_json::Value> = report
        .entries
        .iter()
        .map(|entry| {
            let resolved = &entry.resolved;
            let mut url = serde_json::json!({
                "order_index": resolved.order_index,
                "url": resolved.url,
                "lastmod": resolved.lastmod,
                "priority": resolved.priority,
                "changefreq": resolved.changefreq,
            });

            let details = match &entry.result {
                None => serde_json::json!({ "status": NOT_PROBED }),
                Some(result) => match &result.outcome {
                    ProbeOutcome::Success {
                        http_status,
                        latency,
                        content_length,
                        final_url,
                        redirect_chain,
                        signals,
                    } => serde_json::json!({
                        "status": "success",
                        "http_status": http_status,
                        "latency_ms": millis(*latency),
                        "content_length": content_length,
                        "final_url": final_url,
                        "redirect_chain": redirect_chain,
                        "signals": signals,
                        "issues": signals.issues(),
                        "checked_at": result.checked_at.to_rfc3339(),
                    }),
                    ProbeOutcome::Failure {
                        kind,
                        message,
                        http_status,
                    } => serde_json::json!({
                        "status": "failure",
                        "error_kind": kind,
                        "message": message,
                        "http_status": http_status,
                        "checked_at": result.checked_at.to_rfc3339(),
                    }),
                },
            };

            if let (Some(target), serde_json::Value::Object(extra)) = (url.as_object_mut(), details) {
                target.extend(extra);
            }
            url
        })
        .collect();

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Sitescan",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json",
            },
            "complete": report.complete,
            "summary": {
                "total_urls": summary.total,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "not_probed": summary.pending,
                "success_rate": summary.success_rate(),
                "failures_by_kind": summary.failures_by_kind,
                "latency_ms": summary.latency.map(|l| serde_json::json!({
                    "min": millis(l.min),
                    "mean": millis(l.mean),
                    "p50": millis(l.p50),
                    "p95": millis(l.p95),
                })),
                "seo_errors": total_errors,
                "seo_warnings": total_warnings,
            },
            "urls": urls,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_text_report(report: &AnalysisReport) -> String {
    let summary = &report.summary;
    let mut text = String::new();

    text.push_str(RULE);
    text.push('\n');
    text.push_str("                           SITESCAN SEO REPORT\n");
    text.push_str(RULE);
    text.push_str("\n\n");

    if report.complete {
        text.push_str("Status:         Complete\n");
    } else {
        text.push_str(&format!(
            "Status:         Incomplete ({} URLs not probed)\n",
            summary.pending
        ));
    }
    text.push_str(&format!("Total URLs:     {}\n", summary.total));
    text.push_str(&format!("Succeeded:      {}\n", summary.succeeded));
    text.push_str(&format!("Failed:         {}\n", summary.failed));
    text.push_str(&format!("Success rate:   {:.1}%\n", summary.success_rate()));

    if let Some(latency) = summary.latency {
        text.push_str(&format!(
            "Latency:        min {:.0} ms, mean {:.0} ms, p50 {:.0} ms, p95 {:.0} ms\n",
            millis(latency.min),
            millis(latency.mean),
            millis(latency.p50),
            millis(latency.p95)
        ));
    }

    if !summary.failures_by_kind.is_empty() {
        text.push_str("\nFailures by kind:\n");
        for (kind, count) in &summary.failures_by_kind {
            text.push_str(&format!("  {:<20} {}\n", kind.as_str(), count));
        }
    }

    let (total_errors, total_warnings) = issue_totals(report);
    text.push_str(&format!("\nTotal SEO errors: {}\n", total_errors));
    text.push_str(&format!("Total warnings:   {}\n", total_warnings));

    for (heading, severity) in [
        ("Most frequent errors", IssueSeverity::Error),
        ("Most frequent warnings", IssueSeverity::Warning),
    ] {
        let common = frequent_issues(report, severity, 5);
        if !common.is_empty() {
            text.push_str(&format!("\n{}:\n", heading));
            for (message, count) in common {
                text.push_str(&format!("  • {}: {} times\n", message, count));
            }
        }
    }

    text.push('\n');
    text.push_str(RULE);
    text.push_str("\nURLS\n");
    text.push_str(RULE);
    text.push_str("\n\n");

    for row in report_rows(report) {
        let latency = row
            .latency_ms
            .map(|l| format!("{} ms", l))
            .unwrap_or_else(|| "-".to_string());
        text.push_str(&format!(
            "[{:>4}] {:<18} {:>8}  {}\n",
            row.order_index, row.status, latency, row.url
        ));
        if !row.title.is_empty() {
            text.push_str(&format!("       title: {}\n", row.title));
        }
    }

    text.push('\n');
    text.push_str(RULE);
    text.push_str("\nGenerated by Sitescan\n");
    text
}

pub fn generate_report(report: &AnalysisReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Csv => Ok(generate_csv_report(report)),
        ReportFormat::Json => generate_json_report(report),
        ReportFormat::Text => Ok(generate_text_report(report)),
    }
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn default_report_path(prefix: &str, format: ReportFormat, now: NaiveDateTime) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.{}",
        prefix,
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
