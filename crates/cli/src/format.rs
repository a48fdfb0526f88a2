//! Output → human/json/raw string formatting.
//!
//! Three modes:
//! - **Human** (default): labelled, e.g. `(case) 20250513-0001`
//! - **JSON** (`--json`): `serde_json::to_string_pretty`
//! - **Raw** (`--raw`): bare values, one per line

use serde_json::json;
use tally_core::TallyError;
use tally_primitives::Report;

use crate::state::Output;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
    Raw,
}

/// Format a successful output.
pub fn format_output(output: &Output, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => format_json(output),
        OutputMode::Raw => format_raw(output),
        OutputMode::Human => format_human(output),
    }
}

/// Format an error.
pub fn format_error(err: &TallyError, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            let body = json!({ "error": err.to_string() });
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
        }
        OutputMode::Raw => err.to_string(),
        OutputMode::Human => format!("(error) {}", err),
    }
}

// =========================================================================
// JSON
// =========================================================================

fn format_json(output: &Output) -> String {
    let body = match output {
        Output::CaseId(id) => json!({ "case_id": id }),
        Output::Count { date, count } => json!({ "date": date, "count": count }),
        Output::Counters(counts) => json!(counts
            .iter()
            .map(|(date, count)| json!({ "date": date, "count": count }))
            .collect::<Vec<_>>()),
        Output::MaybeReport(report) => json!(report),
        Output::Reports(reports) => json!(reports),
    };
    serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
}

// =========================================================================
// Raw
// =========================================================================

fn format_raw(output: &Output) -> String {
    match output {
        Output::CaseId(id) => id.to_string(),
        Output::Count { count, .. } => count.to_string(),
        Output::Counters(counts) => counts
            .iter()
            .map(|(date, count)| format!("{} {}", date, count))
            .collect::<Vec<_>>()
            .join("\n"),
        Output::MaybeReport(Some(report)) => format!("{} {}", report.case_id, report.status),
        Output::MaybeReport(None) => String::new(),
        Output::Reports(reports) => reports
            .iter()
            .map(|r| format!("{} {}", r.case_id, r.status))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

// =========================================================================
// Human
// =========================================================================

fn format_human(output: &Output) -> String {
    match output {
        Output::CaseId(id) => format!("(case) {}", id),
        Output::Count { date, count } => format!("(count) {} {}", date, count),
        Output::Counters(counts) if counts.is_empty() => "(empty)".to_string(),
        Output::Counters(counts) => counts
            .iter()
            .enumerate()
            .map(|(i, (date, count))| format!("{}) {} {}", i + 1, date, count))
            .collect::<Vec<_>>()
            .join("\n"),
        Output::MaybeReport(Some(report)) => format_report_human(report),
        Output::MaybeReport(None) => "(nil)".to_string(),
        Output::Reports(reports) if reports.is_empty() => "(empty)".to_string(),
        Output::Reports(reports) => reports
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}) {} [{}] {}", i + 1, r.case_id, r.status, r.description))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_report_human(report: &Report) -> String {
    let mut lines = vec![
        format!("case:        {}", report.case_id),
        format!("status:      {}", report.status),
        format!("description: {}", report.description),
        format!(
            "location:    {}, {}",
            report.location.latitude, report.location.longitude
        ),
        format!("reported by: {}", report.reported_by),
        format!("created at:  {}", report.created_at),
    ];
    if let Some(url) = &report.photo_url {
        lines.push(format!("photo:       {}", url));
    }
    if let Some(volunteer) = &report.assigned_to {
        lines.push(format!("assigned to: {}", volunteer));
    }
    if let Some(name) = &report.volunteer_name {
        match &report.volunteer_contact {
            Some(contact) => lines.push(format!("volunteer:   {} ({})", name, contact)),
            None => lines.push(format!("volunteer:   {}", name)),
        }
    }
    if let Some(comment) = &report.closing_comment {
        lines.push(format!("comment:     {}", comment));
    }
    if let Some(at) = &report.closed_at {
        lines.push(format!("closed at:   {}", at));
    }
    lines.join("\n")
}
