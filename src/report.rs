//! Interval reports (CSV or JSON).

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::store::IntervalRecord;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{other}' (expected csv or json)")),
        }
    }
}

/// One line of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub interval_id: i64,
    pub activity: String,
    pub face: Option<i8>,
    pub start: String,
    pub finish: Option<String>,
    pub duration_secs: Option<i64>,
}

fn format_time(time: DateTime<Utc>, tz: Tz) -> String {
    time.with_timezone(&tz).to_rfc3339()
}

/// Build report rows, rendering timestamps in `tz`.
pub fn build_rows(records: &[IntervalRecord], tz: Tz) -> Vec<ReportRow> {
    records
        .iter()
        .map(|record| {
            let interval = &record.interval;
            ReportRow {
                interval_id: interval.id,
                activity: record
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("activity #{}", interval.activity_id)),
                face: record.face.map(|f| f.0),
                start: format_time(interval.start, tz),
                finish: interval.finish.map(|t| format_time(t, tz)),
                duration_secs: interval.finish.map(|t| (t - interval.start).num_seconds()),
            }
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render rows as CSV with a header line.
pub fn to_csv(rows: &[ReportRow]) -> String {
    let mut out = String::from("id,activity,face,start,finish,duration_secs\n");
    for row in rows {
        let line = [
            row.interval_id.to_string(),
            csv_field(&row.activity),
            row.face.map(|f| f.to_string()).unwrap_or_default(),
            row.start.clone(),
            row.finish.clone().unwrap_or_default(),
            row.duration_secs.map(|d| d.to_string()).unwrap_or_default(),
        ]
        .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Render rows as pretty JSON.
pub fn to_json(rows: &[ReportRow]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(rows)
}

/// Render rows in `format`.
pub fn render(rows: &[ReportRow], format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Csv => Ok(to_csv(rows)),
        ReportFormat::Json => to_json(rows),
    }
}
