//! ArgMatches → Action conversion.

use chrono::NaiveDate;
use clap::ArgMatches;
use tally_primitives::{CaseId, DatePrefix, Location, NewReport, Volunteer};

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Allocate a case ID, for today or a given day.
    Allocate { date: Option<DatePrefix> },
    /// Show one day's count.
    Count { date: Option<DatePrefix> },
    /// List every day's count.
    Counters,
    /// File a report.
    ReportCreate(NewReport),
    /// Show a report.
    ReportGet(CaseId),
    /// List a day's reports.
    ReportList { date: Option<DatePrefix> },
    /// Claim a report for a volunteer.
    ReportClaim { case_id: CaseId, volunteer: Volunteer },
    /// Close a claimed report.
    ReportClose { case_id: CaseId, comment: String },
}

/// Convert clap matches into an [`Action`].
pub fn matches_to_action(matches: &ArgMatches) -> Result<Action, String> {
    let (sub_name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| "No command provided".to_string())?;

    match sub_name {
        "allocate" => Ok(Action::Allocate {
            date: date_option(sub_matches)?,
        }),
        "count" => Ok(Action::Count {
            date: date_option(sub_matches)?,
        }),
        "counters" => Ok(Action::Counters),
        "report" => parse_report(sub_matches),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn parse_report(matches: &ArgMatches) -> Result<Action, String> {
    let (sub_name, sub) = matches
        .subcommand()
        .ok_or_else(|| "report: missing subcommand".to_string())?;

    match sub_name {
        "create" => Ok(Action::ReportCreate(NewReport {
            description: required_str(sub, "description")?,
            location: Location::new(required_f64(sub, "lat")?, required_f64(sub, "lon")?),
            photo_url: sub.get_one::<String>("photo-url").cloned(),
            reported_by: required_str(sub, "reported-by")?,
        })),
        "get" => Ok(Action::ReportGet(case_id(sub)?)),
        "list" => Ok(Action::ReportList {
            date: date_option(sub)?,
        }),
        "claim" => Ok(Action::ReportClaim {
            case_id: case_id(sub)?,
            volunteer: Volunteer::new(
                required_str(sub, "volunteer")?,
                required_str(sub, "name")?,
                required_str(sub, "contact")?,
            ),
        }),
        "close" => Ok(Action::ReportClose {
            case_id: case_id(sub)?,
            comment: required_str(sub, "comment")?,
        }),
        other => Err(format!("Unknown report command: {}", other)),
    }
}

// =========================================================================
// Argument helpers
// =========================================================================

fn required_str(matches: &ArgMatches, name: &str) -> Result<String, String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| format!("missing --{}", name))
}

fn required_f64(matches: &ArgMatches, name: &str) -> Result<f64, String> {
    matches
        .get_one::<f64>(name)
        .copied()
        .ok_or_else(|| format!("missing --{}", name))
}

fn case_id(matches: &ArgMatches) -> Result<CaseId, String> {
    required_str(matches, "case_id")?
        .parse()
        .map_err(|e| format!("{}", e))
}

fn date_option(matches: &ArgMatches) -> Result<Option<DatePrefix>, String> {
    matches
        .get_one::<String>("date")
        .map(|s| parse_date(s))
        .transpose()
}

/// Parse `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_date(s: &str) -> Result<DatePrefix, String> {
    if s.contains('-') {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| format!("invalid date '{}': {}", s, e))?;
        DatePrefix::new(date).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: tally_core::TallyError| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build_cli;

    fn parse(args: &[&str]) -> Result<Action, String> {
        let mut argv = vec!["tally"];
        argv.extend_from_slice(args);
        let matches = build_cli()
            .try_get_matches_from(argv)
            .map_err(|e| e.to_string())?;
        matches_to_action(&matches)
    }

    #[test]
    fn test_parse_date_forms() {
        let expected = DatePrefix::from_ymd(2025, 5, 13).unwrap();
        assert_eq!(parse_date("2025-05-13").unwrap(), expected);
        assert_eq!(parse_date("20250513").unwrap(), expected);
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_allocate() {
        assert_eq!(parse(&["allocate"]).unwrap(), Action::Allocate { date: None });
        assert_eq!(
            parse(&["allocate", "--date", "2025-05-13"]).unwrap(),
            Action::Allocate {
                date: Some(DatePrefix::from_ymd(2025, 5, 13).unwrap())
            }
        );
    }

    #[test]
    fn test_report_create() {
        let action = parse(&[
            "report",
            "create",
            "--description",
            "stray kitten",
            "--lat",
            "51.5",
            "--lon",
            "-0.12",
            "--reported-by",
            "user-1",
        ])
        .unwrap();
        assert_eq!(
            action,
            Action::ReportCreate(NewReport {
                description: "stray kitten".to_string(),
                location: Location::new(51.5, -0.12),
                photo_url: None,
                reported_by: "user-1".to_string(),
            })
        );
    }

    #[test]
    fn test_report_claim_requires_volunteer() {
        assert!(parse(&["report", "claim", "20250513-0001"]).is_err());
        assert!(parse(&["report", "claim", "20250513-0001", "--volunteer", "v9"]).is_err());
        assert_eq!(
            parse(&[
                "report",
                "claim",
                "20250513-0001",
                "--volunteer",
                "v9",
                "--name",
                "Ana",
                "--contact",
                "555-0199",
            ])
            .unwrap(),
            Action::ReportClaim {
                case_id: "20250513-0001".parse().unwrap(),
                volunteer: Volunteer::new("v9", "Ana", "555-0199"),
            }
        );
    }

    #[test]
    fn test_report_close_requires_comment() {
        assert!(parse(&["report", "close", "20250513-0001"]).is_err());
        assert_eq!(
            parse(&["report", "close", "20250513-0001", "--comment", "rehomed"]).unwrap(),
            Action::ReportClose {
                case_id: "20250513-0001".parse().unwrap(),
                comment: "rehomed".to_string(),
            }
        );
        assert!(parse(&["report", "resolve", "20250513-0001"]).is_err());
    }

    #[test]
    fn test_bad_case_id() {
        let err = parse(&["report", "get", "20250513-1"]).unwrap_err();
        assert!(err.contains("20250513-1"));
    }
}
