//! Session wrapper executing parsed actions.
//!
//! Holds the database handle plus the allocator and report facades built
//! over it. All three share one `Arc<Database>`.

use std::sync::Arc;

use tally_core::TallyResult;
use tally_engine::Database;
use tally_primitives::{CaseId, CaseIdAllocator, DatePrefix, Report, ReportStore};

use crate::parse::Action;

/// Result of executing an [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A newly issued case ID.
    CaseId(CaseId),
    /// One day's count.
    Count { date: DatePrefix, count: u64 },
    /// Every day's count, oldest first.
    Counters(Vec<(DatePrefix, u64)>),
    /// A single report, or nothing.
    MaybeReport(Option<Report>),
    /// A list of reports.
    Reports(Vec<Report>),
}

/// Wraps the database handle and its facades.
pub struct SessionState {
    db: Arc<Database>,
    reports: ReportStore,
}

impl SessionState {
    /// Create a new SessionState over `db`.
    pub fn new(db: Arc<Database>) -> Self {
        let reports = ReportStore::new(Arc::clone(&db));
        Self { db, reports }
    }

    fn allocator(&self) -> &CaseIdAllocator {
        self.reports.allocator()
    }

    fn today(&self) -> TallyResult<DatePrefix> {
        let allocator = self.allocator();
        DatePrefix::from_timestamp(allocator.now(), allocator.date_basis())
    }

    fn date_or_today(&self, date: Option<DatePrefix>) -> TallyResult<DatePrefix> {
        match date {
            Some(date) => Ok(date),
            None => self.today(),
        }
    }

    /// Execute an action.
    pub fn execute(&self, action: Action) -> TallyResult<Output> {
        match action {
            Action::Allocate { date: Some(date) } => {
                Ok(Output::CaseId(self.allocator().allocate_for(date)?))
            }
            Action::Allocate { date: None } => Ok(Output::CaseId(self.allocator().allocate_now()?)),
            Action::Count { date } => {
                let date = self.date_or_today(date)?;
                Ok(Output::Count {
                    date,
                    count: self.allocator().current_count(date)?,
                })
            }
            Action::Counters => Ok(Output::Counters(self.allocator().daily_counts()?)),
            Action::ReportCreate(new_report) => {
                Ok(Output::CaseId(self.reports.create_report(new_report)?))
            }
            Action::ReportGet(case_id) => {
                Ok(Output::MaybeReport(self.reports.get_report(case_id)?))
            }
            Action::ReportList { date } => {
                let date = self.date_or_today(date)?;
                Ok(Output::Reports(self.reports.list_reports(date)?))
            }
            Action::ReportClaim { case_id, volunteer } => Ok(Output::MaybeReport(Some(
                self.reports.claim(case_id, &volunteer)?,
            ))),
            Action::ReportClose { case_id, comment } => Ok(Output::MaybeReport(Some(
                self.reports.close(case_id, &comment)?,
            ))),
        }
    }

    /// Persist everything before exit.
    pub fn close(&self) -> TallyResult<()> {
        self.db.shutdown()
    }
}
