use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Lifecycle of a report. `Submitted` is accepted on input as an alias of `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(alias = "Submitted")]
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Closed,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Open,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
        ReportStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "Open",
            ReportStatus::InProgress => "In Progress",
            ReportStatus::Resolved => "Resolved",
            ReportStatus::Closed => "Closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Open" | "Submitted" => Some(ReportStatus::Open),
            "In Progress" => Some(ReportStatus::InProgress),
            "Resolved" => Some(ReportStatus::Resolved),
            "Closed" => Some(ReportStatus::Closed),
            _ => None,
        }
    }

    /// Forward-only progression, with `Closed` reachable from anywhere.
    /// Re-applying the current status is treated as a no-op and allowed.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        if *self == next || next == ReportStatus::Closed {
            return true;
        }
        matches!(
            (self, next),
            (ReportStatus::Open, ReportStatus::InProgress)
                | (ReportStatus::InProgress, ReportStatus::Resolved)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualLocation {
    pub state: String,
    pub district: String,
    pub city: String,
    pub address: String,
}

/// Exactly one representation is populated per report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportLocation {
    Point(GeoPoint),
    Manual(ManualLocation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn into_record(self, now: DateTime<Utc>) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            points: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

pub enum UserLookup<'a> {
    Email(&'a str),
    Username(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub status: ReportStatus,
    pub location: ReportLocation,
    pub photo_url: Option<String>,
    pub upvote_count: i64,
    pub is_anonymous: bool,
    pub resolution_rewarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub location: ReportLocation,
    pub photo_url: Option<String>,
    pub is_anonymous: bool,
}

impl NewReport {
    pub fn into_record(self, now: DateTime<Utc>) -> ReportRecord {
        ReportRecord {
            id: Uuid::new_v4(),
            author_id: self.author_id,
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            status: ReportStatus::Open,
            location: self.location,
            photo_url: self.photo_url,
            upvote_count: 0,
            is_anonymous: self.is_anonymous,
            resolution_rewarded: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Owner-mutable fields. The upvote counter is only ever moved by the toggle.
#[derive(Debug, Clone, Default)]
pub struct ReportChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ReportStatus>,
    pub resolution_rewarded: Option<bool>,
}

impl ReportChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.resolution_rewarded.is_none()
    }

    pub fn apply(&self, report: &mut ReportRecord, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            report.title = title.clone();
        }
        if let Some(description) = &self.description {
            report.description = description.clone();
        }
        if let Some(status) = self.status {
            report.status = status;
        }
        if let Some(rewarded) = self.resolution_rewarded {
            report.resolution_rewarded = rewarded;
        }
        report.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpvoteRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub report_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpvoteToggle {
    pub upvoted: bool,
    pub report: ReportRecord,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub author_id: Option<Uuid>,
}

impl ReportFilter {
    pub fn matches(&self, report: &ReportRecord) -> bool {
        self.status.map_or(true, |s| s == report.status)
            && self.author_id.map_or(true, |a| a == report.author_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    UpvoteCount,
    Title,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "createdAt" => Some(SortField::CreatedAt),
            "updatedAt" => Some(SortField::UpdatedAt),
            "upvoteCount" => Some(SortField::UpvoteCount),
            "title" => Some(SortField::Title),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportSort {
    pub field: SortField,
    pub order: SortOrder,
}

impl ReportSort {
    /// Orders by the chosen field, then by id ascending so pages never overlap.
    pub fn compare(&self, a: &ReportRecord, b: &ReportRecord) -> Ordering {
        let primary = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::UpvoteCount => a.upvote_count.cmp(&b.upvote_count),
            SortField::Title => a.title.cmp(&b.title),
        };
        let primary = match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportQuery {
    pub filter: ReportFilter,
    pub sort: ReportSort,
    pub skip: u64,
    pub limit: u64,
}

/// Sort, count and slice an already-filtered set in process.
pub(crate) fn paginate_in_memory(
    mut reports: Vec<ReportRecord>,
    query: &ReportQuery,
) -> (Vec<ReportRecord>, u64) {
    let total = reports.len() as u64;
    reports.sort_by(|a, b| query.sort.compare(a, b));
    let page = reports
        .into_iter()
        .skip(query.skip as usize)
        .take(query.limit as usize)
        .collect();
    (page, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(title: &str, upvotes: i64) -> ReportRecord {
        NewReport {
            author_id: Uuid::new_v4(),
            title: title.to_string(),
            description: "a description".to_string(),
            category: "Other".to_string(),
            priority: Priority::Medium,
            location: ReportLocation::Point(GeoPoint {
                longitude: 0.0,
                latitude: 0.0,
            }),
            photo_url: None,
            is_anonymous: false,
        }
        .into_record(Utc::now())
        .with_upvotes(upvotes)
    }

    impl ReportRecord {
        fn with_upvotes(mut self, n: i64) -> Self {
            self.upvote_count = n;
            self
        }
    }

    #[test]
    fn status_transitions() {
        use ReportStatus::*;
        assert!(Open.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Closed));
        assert!(Open.can_transition_to(Closed));
        assert!(Open.can_transition_to(Open));
        assert!(!Open.can_transition_to(Resolved));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Closed.can_transition_to(InProgress));
    }

    #[test]
    fn submitted_is_open() {
        assert_eq!(ReportStatus::parse("Submitted"), Some(ReportStatus::Open));
        let parsed: ReportStatus = serde_json::from_str("\"Submitted\"").unwrap();
        assert_eq!(parsed, ReportStatus::Open);
        assert_eq!(
            serde_json::to_string(&ReportStatus::InProgress).unwrap(),
            "\"In Progress\""
        );
    }

    #[test]
    fn sort_breaks_ties_by_id() {
        let a = report("same", 3);
        let b = report("same", 3);
        let sort = ReportSort {
            field: SortField::UpvoteCount,
            order: SortOrder::Desc,
        };
        let expected = a.id.cmp(&b.id);
        assert_eq!(sort.compare(&a, &b), expected);
    }

    #[test]
    fn paginate_slices_after_sorting() {
        let reports: Vec<_> = (0..25).map(|i| report(&format!("r{i:02}"), i)).collect();
        let query = ReportQuery {
            filter: ReportFilter::default(),
            sort: ReportSort {
                field: SortField::UpvoteCount,
                order: SortOrder::Desc,
            },
            skip: 10,
            limit: 10,
        };
        let (page, total) = paginate_in_memory(reports, &query);
        assert_eq!(total, 25);
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].upvote_count, 14);
        assert_eq!(page[9].upvote_count, 5);
    }

    #[test]
    fn filter_by_status_and_author() {
        let r = report("title", 0);
        let author = r.author_id;
        assert!(ReportFilter::default().matches(&r));
        assert!(ReportFilter {
            status: Some(ReportStatus::Open),
            author_id: Some(author),
        }
        .matches(&r));
        assert!(!ReportFilter {
            status: Some(ReportStatus::Closed),
            author_id: None,
        }
        .matches(&r));
    }
}
