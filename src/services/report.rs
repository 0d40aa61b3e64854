use crate::{
    error::{AppError, AppResult, FieldError},
    response::PaginationMeta,
    services::{
        media::{MediaService, PhotoUpload},
        points::{PointsService, POINTS_REPORT_RESOLVED, POINTS_REPORT_SUBMITTED},
    },
    store::{
        GeoPoint, ManualLocation, NewReport, Priority, ReportChanges, ReportFilter,
        ReportLocation, ReportQuery, ReportRecord, ReportSort, ReportStatus, Store, StoreError,
        UserRecord,
    },
    utils::{
        category::normalize_category,
        validation::{
            check_coordinates, check_trimmed_length, CATEGORY_MAX, DESCRIPTION_MAX,
            DESCRIPTION_MIN, TITLE_MAX, TITLE_MIN,
        },
    },
};
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
/// Largest offset every backend accepts (Postgres binds OFFSET as bigint).
const MAX_OFFSET: u64 = i64::MAX as u64;

/// Unvalidated report submission, as received over the wire.
#[derive(Debug, Clone, Default)]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub priority: Option<String>,
    /// `[longitude, latitude]`
    pub coordinates: Option<Vec<f64>>,
    pub manual_location: Option<ManualLocation>,
    pub is_anonymous: bool,
}

impl ReportDraft {
    /// Collects every failing field before anything is stored.
    pub fn validate(self, author_id: Uuid) -> AppResult<NewReport> {
        let mut errors = Vec::new();

        check_trimmed_length(&mut errors, "title", "Title", &self.title, TITLE_MIN, TITLE_MAX);
        check_trimmed_length(
            &mut errors,
            "description",
            "Description",
            &self.description,
            DESCRIPTION_MIN,
            DESCRIPTION_MAX,
        );

        if let Some(category) = &self.category {
            if category.trim().chars().count() > CATEGORY_MAX {
                errors.push(FieldError::new(
                    "category",
                    format!("Category must be at most {CATEGORY_MAX} characters"),
                ));
            }
        }

        let priority = match self.priority.as_deref().map(str::trim) {
            None | Some("") => Priority::default(),
            Some(raw) => Priority::parse(raw).unwrap_or_else(|| {
                errors.push(FieldError::new(
                    "priority",
                    "Priority must be one of Low, Medium, High",
                ));
                Priority::default()
            }),
        };

        let location = match (self.coordinates, self.manual_location) {
            (Some(_), Some(_)) => {
                errors.push(FieldError::new(
                    "location",
                    "Provide either coordinates or a manual location, not both",
                ));
                None
            }
            (None, None) => {
                errors.push(FieldError::new("location", "Location is required"));
                None
            }
            (Some(coordinates), None) => match coordinates.as_slice() {
                [longitude, latitude] => {
                    let point = GeoPoint {
                        longitude: *longitude,
                        latitude: *latitude,
                    };
                    check_coordinates(&mut errors, &point);
                    Some(ReportLocation::Point(point))
                }
                _ => {
                    errors.push(FieldError::new(
                        "location.coordinates",
                        "Coordinates must be [longitude, latitude]",
                    ));
                    None
                }
            },
            (None, Some(manual)) => {
                for (field, label, value) in [
                    ("manualLocation.state", "State", &manual.state),
                    ("manualLocation.district", "District", &manual.district),
                    ("manualLocation.city", "City", &manual.city),
                    ("manualLocation.address", "Address", &manual.address),
                ] {
                    if value.trim().is_empty() {
                        errors.push(FieldError::new(field, format!("{label} is required")));
                    }
                }
                Some(ReportLocation::Manual(ManualLocation {
                    state: manual.state.trim().to_string(),
                    district: manual.district.trim().to_string(),
                    city: manual.city.trim().to_string(),
                    address: manual.address.trim().to_string(),
                }))
            }
        };

        match location {
            Some(location) if errors.is_empty() => Ok(NewReport {
                author_id,
                title: self.title.trim().to_string(),
                description: self.description.trim().to_string(),
                category: normalize_category(self.category.as_deref()),
                priority,
                location,
                photo_url: None,
                is_anonymous: self.is_anonymous,
            }),
            _ => Err(AppError::ValidationFailed(errors)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ListParams {
    pub page: u64,
    pub limit: u64,
    pub sort: ReportSort,
    pub status: Option<ReportStatus>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            sort: ReportSort::default(),
            status: None,
        }
    }
}

/// A report together with its author, when the author is still around.
#[derive(Debug, Clone)]
pub struct ReportDetails {
    pub report: ReportRecord,
    pub author: Option<UserRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub open: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub closed: u64,
    pub total: u64,
}

pub struct ReportService {
    store: Store,
    media: MediaService,
}

impl ReportService {
    pub fn new(store: Store, media: MediaService) -> Self {
        Self { store, media }
    }

    /// The photo, when present, is validated and uploaded before the record
    /// is written so the stored URL always points at a finished object.
    pub async fn create(
        &self,
        author_id: Uuid,
        draft: ReportDraft,
        photo: Option<PhotoUpload>,
    ) -> AppResult<ReportDetails> {
        let mut new_report = draft.validate(author_id)?;

        let author = self
            .store
            .users
            .find_user_by_id(author_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(photo) = &photo {
            new_report.photo_url = Some(self.media.store_photo(photo).await?);
        }

        let report = match self.store.reports.create_report(new_report.clone()).await {
            Ok(report) => report,
            Err(e) => {
                if let Some(url) = &new_report.photo_url {
                    self.media.remove_best_effort(url).await;
                }
                return Err(e.into());
            }
        };

        PointsService::new(self.store.clone())
            .award(author_id, POINTS_REPORT_SUBMITTED, "report submitted")
            .await;
        tracing::info!("Report {} created by {}", report.id, author_id);

        // Re-read so the author carries the points just awarded.
        let author = self
            .store
            .users
            .find_user_by_id(author_id)
            .await?
            .unwrap_or(author);
        Ok(ReportDetails {
            report,
            author: Some(author),
        })
    }

    pub async fn list(&self, params: ListParams) -> AppResult<(Vec<ReportDetails>, PaginationMeta)> {
        self.list_filtered(
            ReportFilter {
                status: params.status,
                author_id: None,
            },
            params,
        )
        .await
    }

    pub async fn list_mine(
        &self,
        user_id: Uuid,
        params: ListParams,
    ) -> AppResult<(Vec<ReportDetails>, PaginationMeta)> {
        self.list_filtered(
            ReportFilter {
                status: params.status,
                author_id: Some(user_id),
            },
            params,
        )
        .await
    }

    async fn list_filtered(
        &self,
        filter: ReportFilter,
        params: ListParams,
    ) -> AppResult<(Vec<ReportDetails>, PaginationMeta)> {
        let page = params.page.max(1);
        let limit = params.limit.clamp(1, MAX_PAGE_SIZE);
        let query = ReportQuery {
            filter,
            sort: params.sort,
            skip: (page - 1).saturating_mul(limit).min(MAX_OFFSET),
            limit,
        };

        let (reports, total) = self.store.reports.find_reports(&query).await?;
        let details = self.with_authors(reports).await?;
        Ok((details, PaginationMeta::new(page, limit, total)))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ReportDetails> {
        let report = self.load(id).await?;
        let author = self.store.users.find_user_by_id(report.author_id).await?;
        Ok(ReportDetails { report, author })
    }

    pub async fn update(
        &self,
        id: Uuid,
        caller_id: Uuid,
        update: ReportUpdate,
    ) -> AppResult<ReportDetails> {
        let report = self.load(id).await?;
        ensure_owner(&report, caller_id)?;

        let changes = plan_changes(&report, update)?;
        let rewarded_now = changes.resolution_rewarded == Some(true);

        let report = self
            .store
            .reports
            .update_report(id, changes)
            .await
            .map_err(report_not_found)?;

        if rewarded_now {
            PointsService::new(self.store.clone())
                .award(report.author_id, POINTS_REPORT_RESOLVED, "report resolved")
                .await;
        }

        let author = self.store.users.find_user_by_id(report.author_id).await?;
        Ok(ReportDetails { report, author })
    }

    pub async fn delete(&self, id: Uuid, caller_id: Uuid) -> AppResult<()> {
        let report = self.load(id).await?;
        ensure_owner(&report, caller_id)?;

        if let Some(url) = &report.photo_url {
            self.media.remove_best_effort(url).await;
        }
        self.store
            .reports
            .delete_report(id)
            .await
            .map_err(report_not_found)?;
        tracing::info!("Report {} deleted by {}", id, caller_id);
        Ok(())
    }

    /// Returns the report as it stands after the toggle and whether the
    /// caller's upvote now exists.
    pub async fn toggle_upvote(&self, id: Uuid, user_id: Uuid) -> AppResult<(ReportDetails, bool)> {
        let toggle = self
            .store
            .upvotes
            .toggle_upvote(user_id, id)
            .await
            .map_err(report_not_found)?;
        let author = self
            .store
            .users
            .find_user_by_id(toggle.report.author_id)
            .await?;
        Ok((
            ReportDetails {
                report: toggle.report,
                author,
            },
            toggle.upvoted,
        ))
    }

    pub async fn stats(&self) -> AppResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for status in ReportStatus::ALL {
            let n = self
                .store
                .reports
                .count_reports(&ReportFilter {
                    status: Some(status),
                    author_id: None,
                })
                .await?;
            match status {
                ReportStatus::Open => counts.open = n,
                ReportStatus::InProgress => counts.in_progress = n,
                ReportStatus::Resolved => counts.resolved = n,
                ReportStatus::Closed => counts.closed = n,
            }
            counts.total += n;
        }
        Ok(counts)
    }

    async fn load(&self, id: Uuid) -> AppResult<ReportRecord> {
        self.store
            .reports
            .find_report_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))
    }

    async fn with_authors(&self, reports: Vec<ReportRecord>) -> AppResult<Vec<ReportDetails>> {
        let mut authors: HashMap<Uuid, Option<UserRecord>> = HashMap::new();
        let mut details = Vec::with_capacity(reports.len());
        for report in reports {
            let author = match authors.get(&report.author_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = self.store.users.find_user_by_id(report.author_id).await?;
                    authors.insert(report.author_id, found.clone());
                    found
                }
            };
            details.push(ReportDetails { report, author });
        }
        Ok(details)
    }
}

fn ensure_owner(report: &ReportRecord, caller_id: Uuid) -> AppResult<()> {
    if report.author_id != caller_id {
        return Err(AppError::Forbidden(
            "You can only modify your own reports".to_string(),
        ));
    }
    Ok(())
}

fn report_not_found(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::NotFound("Report not found".to_string()),
        other => other.into(),
    }
}

/// Validates an owner's update against the current report.
fn plan_changes(report: &ReportRecord, update: ReportUpdate) -> AppResult<ReportChanges> {
    let mut errors = Vec::new();
    let mut changes = ReportChanges::default();

    if let Some(title) = update.title {
        check_trimmed_length(&mut errors, "title", "Title", &title, TITLE_MIN, TITLE_MAX);
        changes.title = Some(title.trim().to_string());
    }
    if let Some(description) = update.description {
        check_trimmed_length(
            &mut errors,
            "description",
            "Description",
            &description,
            DESCRIPTION_MIN,
            DESCRIPTION_MAX,
        );
        changes.description = Some(description.trim().to_string());
    }
    if let Some(raw) = update.status {
        match ReportStatus::parse(&raw) {
            None => errors.push(FieldError::new(
                "status",
                "Status must be one of Open, In Progress, Resolved, Closed",
            )),
            Some(next) if !report.status.can_transition_to(next) => errors.push(FieldError::new(
                "status",
                format!(
                    "Cannot change status from {} to {}",
                    report.status.as_str(),
                    next.as_str()
                ),
            )),
            Some(next) => {
                if next == ReportStatus::Resolved && !report.resolution_rewarded {
                    changes.resolution_rewarded = Some(true);
                }
                changes.status = Some(next);
            }
        }
    }

    if !errors.is_empty() {
        return Err(AppError::ValidationFailed(errors));
    }
    if changes.is_empty() {
        return Err(AppError::invalid(
            "body",
            "Provide at least one of title, description or status",
        ));
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media::LocalMediaStorage;
    use crate::store::NewUser;
    use std::sync::Arc;

    fn draft() -> ReportDraft {
        ReportDraft {
            title: "Pothole on Main St".to_string(),
            description: "Deep and wide".to_string(),
            category: Some("road".to_string()),
            priority: Some("high".to_string()),
            coordinates: Some(vec![77.5946, 12.9716]),
            manual_location: None,
            is_anonymous: false,
        }
    }

    async fn setup() -> (ReportService, Store, UserRecord, tempfile::TempDir) {
        let store = Store::memory();
        let dir = tempfile::tempdir().unwrap();
        let media = MediaService::new(Arc::new(LocalMediaStorage::new(dir.path())), 1024 * 1024);
        let user = store
            .users
            .create_user(NewUser {
                username: "reporter".to_string(),
                email: "reporter@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        (ReportService::new(store.clone(), media), store, user, dir)
    }

    fn failing_fields(err: AppError) -> Vec<String> {
        match err {
            AppError::ValidationFailed(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn draft_normalizes_fields() {
        let report = draft().validate(Uuid::new_v4()).unwrap();
        assert_eq!(report.category, "Road");
        assert_eq!(report.priority, Priority::High);
        assert!(matches!(report.location, ReportLocation::Point(_)));
    }

    #[test]
    fn draft_lists_every_failing_field() {
        let bad = ReportDraft {
            title: "abc".to_string(),
            description: "short".to_string(),
            priority: Some("urgent".to_string()),
            coordinates: Some(vec![200.0, -100.0]),
            ..draft()
        };
        let fields = failing_fields(bad.validate(Uuid::new_v4()).unwrap_err());
        assert_eq!(
            fields,
            [
                "title",
                "description",
                "priority",
                "location.coordinates",
                "location.coordinates"
            ]
        );
    }

    #[test]
    fn draft_needs_exactly_one_location() {
        let neither = ReportDraft {
            coordinates: None,
            ..draft()
        };
        assert_eq!(
            failing_fields(neither.validate(Uuid::new_v4()).unwrap_err()),
            ["location"]
        );

        let manual = ManualLocation {
            state: "Karnataka".to_string(),
            district: "Bengaluru Urban".to_string(),
            city: "Bengaluru".to_string(),
            address: " ".to_string(),
        };
        let both = ReportDraft {
            manual_location: Some(manual.clone()),
            ..draft()
        };
        assert_eq!(
            failing_fields(both.validate(Uuid::new_v4()).unwrap_err()),
            ["location"]
        );

        let blank_address = ReportDraft {
            coordinates: None,
            manual_location: Some(manual),
            ..draft()
        };
        assert_eq!(
            failing_fields(blank_address.validate(Uuid::new_v4()).unwrap_err()),
            ["manualLocation.address"]
        );
    }

    #[tokio::test]
    async fn invalid_draft_writes_nothing() {
        let (service, store, user, _dir) = setup().await;
        let bad = ReportDraft {
            coordinates: Some(vec![200.0, 0.0]),
            ..draft()
        };
        assert!(service.create(user.id, bad, None).await.is_err());
        assert_eq!(
            store.reports.count_reports(&ReportFilter::default()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let (service, _, user, _dir) = setup().await;
        service.create(user.id, draft(), None).await.unwrap();

        let (reports, meta) = service
            .list(ListParams {
                page: u64::MAX,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(reports.is_empty());
        assert_eq!(meta.current_page, u64::MAX);
        assert_eq!(meta.total_items, 1);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next_page);
        assert_eq!(meta.prev_page, Some(u64::MAX - 1));
    }

    #[tokio::test]
    async fn create_awards_points() {
        let (service, store, user, _dir) = setup().await;
        let created = service.create(user.id, draft(), None).await.unwrap();
        assert_eq!(created.report.status, ReportStatus::Open);
        assert_eq!(created.report.upvote_count, 0);

        let author = store.users.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(author.points, POINTS_REPORT_SUBMITTED);
    }

    #[tokio::test]
    async fn resolution_rewards_once() {
        let (service, store, user, _dir) = setup().await;
        let id = service.create(user.id, draft(), None).await.unwrap().report.id;

        for status in ["In Progress", "Resolved", "Resolved", "Closed"] {
            service
                .update(
                    id,
                    user.id,
                    ReportUpdate {
                        status: Some(status.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let author = store.users.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(author.points, POINTS_REPORT_SUBMITTED + POINTS_REPORT_RESOLVED);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let (service, _, user, _dir) = setup().await;
        let id = service.create(user.id, draft(), None).await.unwrap().report.id;

        let err = service
            .update(
                id,
                user.id,
                ReportUpdate {
                    status: Some("Resolved".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(failing_fields(err), ["status"]);
    }

    #[tokio::test]
    async fn only_the_owner_mutates() {
        let (service, _, user, _dir) = setup().await;
        let id = service.create(user.id, draft(), None).await.unwrap().report.id;
        let stranger = Uuid::new_v4();

        let update = ReportUpdate {
            title: Some("Someone else's title".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(id, stranger, update).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete(id, stranger).await,
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(service.get(id).await.unwrap().report.title, "Pothole on Main St");
    }

    #[tokio::test]
    async fn delete_removes_photo() {
        let (service, _, user, dir) = setup().await;
        let photo = PhotoUpload {
            bytes: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A],
            content_type: "image/png".to_string(),
            file_name: None,
        };
        let created = service.create(user.id, draft(), Some(photo)).await.unwrap();
        let url = created.report.photo_url.clone().unwrap();
        let on_disk = dir.path().join(url.trim_start_matches("/uploads/"));
        assert!(on_disk.exists());

        service.delete(created.report.id, user.id).await.unwrap();
        assert!(!on_disk.exists());
        assert!(matches!(
            service.get(created.report.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stats_count_per_status() {
        let (service, _, user, _dir) = setup().await;
        for _ in 0..3 {
            service.create(user.id, draft(), None).await.unwrap();
        }
        let id = service.create(user.id, draft(), None).await.unwrap().report.id;
        service
            .update(
                id,
                user.id,
                ReportUpdate {
                    status: Some("Closed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let counts = service.stats().await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                open: 3,
                in_progress: 0,
                resolved: 0,
                closed: 1,
                total: 4,
            }
        );
    }
}
