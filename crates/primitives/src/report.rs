//! ReportStore: case reports keyed by their case identifier
//!
//! A report lives at `reports/{caseId}`. Creating one allocates the case ID
//! first, in its own transaction, and then writes the report. If the second
//! step fails the counter advance stands: the day's sequence skips a report
//! but never reuses a number.
//!
//! ## Status
//!
//! Reports move one step at a time: `unclaimed` → `claimed` → `closed`.
//! A claim records the volunteer; closing records a comment. Both run as
//! retried transactions, so two volunteers claiming the same case at once
//! cannot both succeed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_concurrency::TransactionContext;
use tally_core::{DocumentPath, TallyError, TallyResult, Timestamp, Value};
use tally_engine::Database;
use tracing::info;

use crate::allocator::CaseIdAllocator;
use crate::case_id::{CaseId, DatePrefix};

/// Collection holding one document per report
pub const REPORTS_COLLECTION: &str = "reports";

/// Path of the report document for `case_id`
pub fn report_path(case_id: CaseId) -> TallyResult<DocumentPath> {
    DocumentPath::new(REPORTS_COLLECTION, case_id.to_string())
}

/// Where the animal was seen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Degrees north, -90..=90
    pub latitude: f64,
    /// Degrees east, -180..=180
    pub longitude: f64,
}

impl Location {
    /// Build a location
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Location {
            latitude,
            longitude,
        }
    }

    fn validate(&self) -> TallyResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(TallyError::invalid_input(format!(
                "latitude {} is outside -90..=90",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(TallyError::invalid_input(format!(
                "longitude {} is outside -180..=180",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Waiting for a volunteer
    Unclaimed,
    /// A volunteer has taken the case
    Claimed,
    /// The volunteer finished the case
    Closed,
}

impl ReportStatus {
    /// Lowercase name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Unclaimed => "unclaimed",
            ReportStatus::Claimed => "claimed",
            ReportStatus::Closed => "closed",
        }
    }

    /// Check whether a report may move from `self` to `next`
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Unclaimed, ReportStatus::Claimed)
                | (ReportStatus::Claimed, ReportStatus::Closed)
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = TallyError;

    fn from_str(s: &str) -> TallyResult<Self> {
        match s {
            "unclaimed" => Ok(ReportStatus::Unclaimed),
            "claimed" => Ok(ReportStatus::Claimed),
            "closed" => Ok(ReportStatus::Closed),
            other => Err(TallyError::invalid_input(format!(
                "unknown report status '{}'",
                other
            ))),
        }
    }
}

/// What a reporter submits
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    /// Free-text description of the animal and situation
    pub description: String,
    /// Where it was seen
    pub location: Location,
    /// Uploaded photo, if any
    pub photo_url: Option<String>,
    /// User id of the reporter
    pub reported_by: String,
}

impl NewReport {
    fn validate(&self) -> TallyResult<()> {
        if self.description.trim().is_empty() {
            return Err(TallyError::invalid_input("report description is empty"));
        }
        if self.reported_by.trim().is_empty() {
            return Err(TallyError::invalid_input("report has no reporter"));
        }
        self.location.validate()
    }
}

/// The volunteer taking a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volunteer {
    /// User id, stored as `assigned_to`
    pub id: String,
    /// Name shown to the reporter
    pub name: String,
    /// Phone number or other contact shown to the reporter
    pub contact: String,
}

impl Volunteer {
    /// Build a volunteer
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        contact: impl Into<String>,
    ) -> Self {
        Volunteer {
            id: id.into(),
            name: name.into(),
            contact: contact.into(),
        }
    }

    fn validate(&self) -> TallyResult<()> {
        let fields = [("id", &self.id), ("name", &self.name), ("contact", &self.contact)];
        for (what, value) in fields {
            if value.trim().is_empty() {
                return Err(TallyError::invalid_input(format!(
                    "volunteer {} is empty",
                    what
                )));
            }
        }
        Ok(())
    }
}

/// A stored report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Case identifier, also the document id
    pub case_id: CaseId,
    /// Free-text description
    pub description: String,
    /// Where it was seen
    pub location: Location,
    /// Uploaded photo, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// User id of the reporter
    pub reported_by: String,
    /// Current lifecycle state
    pub status: ReportStatus,
    /// User id of the volunteer who claimed the case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Name of the claiming volunteer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_name: Option<String>,
    /// Contact of the claiming volunteer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_contact: Option<String>,
    /// Volunteer's note on how the case ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_comment: Option<String>,
    /// When the report was created
    pub created_at: Timestamp,
    /// When the case was closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Timestamp>,
}

/// Report records over a [`Database`]
///
/// Stateless apart from its allocator; clones share everything.
#[derive(Debug, Clone)]
pub struct ReportStore {
    allocator: CaseIdAllocator,
}

impl ReportStore {
    /// Store with a default allocator for `db`
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_allocator(CaseIdAllocator::new(db))
    }

    /// Store that allocates and timestamps with `allocator`
    pub fn with_allocator(allocator: CaseIdAllocator) -> Self {
        ReportStore { allocator }
    }

    /// The allocator issuing case IDs for new reports
    pub fn allocator(&self) -> &CaseIdAllocator {
        &self.allocator
    }

    fn db(&self) -> &Arc<Database> {
        self.allocator.database()
    }

    /// Allocate a case ID and store `new_report` under it as `unclaimed`
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty description or reporter, or a location
    ///   off the globe; nothing is allocated
    /// - `AllocationFailed` if no case ID could be issued
    /// - the write's error if the report could not be stored; the case ID
    ///   stays consumed
    pub fn create_report(&self, new_report: NewReport) -> TallyResult<CaseId> {
        new_report.validate()?;

        let now = self.allocator.now();
        let case_id = self.allocator.allocate(now)?;
        let report = Report {
            case_id,
            description: new_report.description,
            location: new_report.location,
            photo_url: new_report.photo_url,
            reported_by: new_report.reported_by,
            status: ReportStatus::Unclaimed,
            assigned_to: None,
            volunteer_name: None,
            volunteer_contact: None,
            closing_comment: None,
            created_at: now,
            closed_at: None,
        };
        let path = report_path(case_id)?;
        let document = Value::from_record(&report)?;

        self.db().transaction(|txn| {
            if txn.exists(&path)? {
                return Err(TallyError::internal(format!(
                    "case ID {} already has a report",
                    case_id
                )));
            }
            txn.put(path.clone(), document)
        })?;

        info!(target: "tally::alloc", case_id = %case_id, "Report created");
        Ok(case_id)
    }

    /// Fetch a report
    pub fn get_report(&self, case_id: CaseId) -> TallyResult<Option<Report>> {
        self.db()
            .get_document(&report_path(case_id)?)?
            .map(|doc| doc.value.to_record())
            .transpose()
    }

    /// Every report opened on `date`, in case ID order
    pub fn list_reports(&self, date: DatePrefix) -> TallyResult<Vec<Report>> {
        let mut reports = Vec::new();
        for (path, doc) in self.db().scan_collection(REPORTS_COLLECTION)? {
            match path.id().parse::<CaseId>() {
                Ok(case_id) if case_id.date() == date => reports.push(doc.value.to_record()?),
                _ => continue,
            }
        }
        reports.sort_by_key(|r: &Report| r.case_id);
        Ok(reports)
    }

    /// Assign an unclaimed report to `volunteer` and mark it claimed
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if any volunteer field is blank, or the report is
    ///   not unclaimed
    /// - `NotFound` for an unknown case ID
    pub fn claim(&self, case_id: CaseId, volunteer: &Volunteer) -> TallyResult<Report> {
        volunteer.validate()?;
        let report = self.update(case_id, |report, _| {
            transition(report, ReportStatus::Claimed)?;
            report.assigned_to = Some(volunteer.id.clone());
            report.volunteer_name = Some(volunteer.name.trim().to_string());
            report.volunteer_contact = Some(volunteer.contact.trim().to_string());
            Ok(())
        })?;

        info!(
            target: "tally::alloc",
            case_id = %case_id,
            volunteer = %volunteer.id,
            "Report claimed"
        );
        Ok(report)
    }

    /// Close a claimed report with the volunteer's closing comment
    ///
    /// The comment is stored trimmed and `closed_at` is set from the clock.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a blank comment, or a report that is not claimed
    /// - `NotFound` for an unknown case ID
    pub fn close(&self, case_id: CaseId, comment: &str) -> TallyResult<Report> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(TallyError::invalid_input("closing comment is empty"));
        }
        let report = self.update(case_id, |report, now| {
            transition(report, ReportStatus::Closed)?;
            report.closing_comment = Some(comment.to_string());
            report.closed_at = Some(now);
            Ok(())
        })?;

        info!(target: "tally::alloc", case_id = %case_id, "Report closed");
        Ok(report)
    }

    fn update<F>(&self, case_id: CaseId, f: F) -> TallyResult<Report>
    where
        F: Fn(&mut Report, Timestamp) -> TallyResult<()>,
    {
        let path = report_path(case_id)?;
        let now = self.allocator.now();

        self.db()
            .transaction_with_retry(self.db().retry_config(), |txn| {
                let mut report = load(txn, &path)?;
                f(&mut report, now)?;
                txn.put(path.clone(), Value::from_record(&report)?)?;
                Ok(report)
            })
    }
}

fn load(txn: &mut TransactionContext, path: &DocumentPath) -> TallyResult<Report> {
    txn.get(path)?
        .ok_or_else(|| TallyError::not_found(path.clone()))?
        .to_record()
}

fn transition(report: &mut Report, next: ReportStatus) -> TallyResult<()> {
    if !report.status.can_transition_to(next) {
        return Err(TallyError::invalid_input(format!(
            "case {} is {} and cannot become {}",
            report.case_id, report.status, next
        )));
    }
    report.status = next;
    Ok(())
}
