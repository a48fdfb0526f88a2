//! Clap command tree definition.

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("tally")
        .about("Daily case ID allocation and case reports")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("Database directory (default: .tally)")
                .global(true),
        )
        .arg(
            Arg::new("cache")
                .long("cache")
                .help("Ephemeral in-memory database, no disk")
                .action(ArgAction::SetTrue)
                .conflicts_with("db")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .conflicts_with("raw")
                .global(true),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .help("Raw output mode (bare values)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_allocate())
        .subcommand(build_count())
        .subcommand(build_counters())
        .subcommand(build_report())
}

fn date_arg() -> Arg {
    Arg::new("date")
        .long("date")
        .short('d')
        .value_name("YYYY-MM-DD")
        .help("Calendar day (default: today)")
}

fn case_id_arg() -> Arg {
    Arg::new("case_id")
        .required(true)
        .value_name("CASE_ID")
        .help("Case ID, e.g. 20250513-0001")
}

// =========================================================================
// Counters
// =========================================================================

fn build_allocate() -> Command {
    Command::new("allocate")
        .about("Allocate the next case ID")
        .arg(date_arg())
}

fn build_count() -> Command {
    Command::new("count")
        .about("Show how many case IDs a day has issued")
        .arg(date_arg())
}

fn build_counters() -> Command {
    Command::new("counters").about("List every day's case count")
}

// =========================================================================
// Reports
// =========================================================================

fn build_report() -> Command {
    Command::new("report")
        .about("Case report operations")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("File a new report and print its case ID")
                .arg(
                    Arg::new("description")
                        .long("description")
                        .required(true)
                        .help("What was seen"),
                )
                .arg(
                    Arg::new("lat")
                        .long("lat")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(f64))
                        .help("Latitude in degrees"),
                )
                .arg(
                    Arg::new("lon")
                        .long("lon")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(f64))
                        .help("Longitude in degrees"),
                )
                .arg(
                    Arg::new("reported-by")
                        .long("reported-by")
                        .required(true)
                        .help("Reporter user id"),
                )
                .arg(
                    Arg::new("photo-url")
                        .long("photo-url")
                        .help("Uploaded photo URL"),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Show one report")
                .arg(case_id_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List a day's reports in case ID order")
                .arg(date_arg()),
        )
        .subcommand(
            Command::new("claim")
                .about("Assign an unclaimed report to a volunteer")
                .arg(case_id_arg())
                .arg(
                    Arg::new("volunteer")
                        .long("volunteer")
                        .required(true)
                        .help("Volunteer user id"),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .required(true)
                        .help("Volunteer name shown to the reporter"),
                )
                .arg(
                    Arg::new("contact")
                        .long("contact")
                        .required(true)
                        .help("Volunteer contact shown to the reporter"),
                ),
        )
        .subcommand(
            Command::new("close")
                .about("Close a claimed report")
                .arg(case_id_arg())
                .arg(
                    Arg::new("comment")
                        .long("comment")
                        .required(true)
                        .help("How the case ended"),
                ),
        )
}
