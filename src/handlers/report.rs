use crate::error::{AppError, AppResult, FieldError};
use crate::handlers::{parse_id, GeoJsonPoint, ManualLocationBody, ReportResponse};
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::media::{MediaService, PhotoUpload};
use crate::services::report::{
    ListParams, ReportDraft, ReportService, ReportUpdate, MAX_PAGE_SIZE,
};
use crate::store::{ReportSort, ReportStatus, SortField, SortOrder, Store};
use crate::utils::category::{suggest_categories, CATEGORIES};
use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Path, Query, Request},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    /// `Low`, `Medium` (default) or `High`
    pub priority: Option<String>,
    /// GeoJSON point; mutually exclusive with `manualLocation`
    pub location: Option<GeoJsonPoint>,
    pub manual_location: Option<ManualLocationBody>,
    #[serde(default)]
    pub is_anonymous: bool,
}

impl CreateReportRequest {
    fn into_draft(self, errors: &mut Vec<FieldError>) -> ReportDraft {
        let coordinates = self.location.map(|point| {
            if point.kind != "Point" {
                errors.push(FieldError::new(
                    "location.type",
                    "Location type must be Point",
                ));
            }
            point.coordinates
        });
        ReportDraft {
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            coordinates,
            manual_location: self.manual_location.map(Into::into),
            is_anonymous: self.is_anonymous,
        }
    }
}

/// `POST /reports` body: plain JSON, or multipart with an optional `photo`
/// file next to the same fields as text parts.
pub struct ReportSubmission {
    pub request: CreateReportRequest,
    pub photo: Option<PhotoUpload>,
    /// Problems found while decoding text parts, reported with the rest.
    pub errors: Vec<FieldError>,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::invalid("photo", "File too large")
    } else {
        AppError::invalid("body", format!("Invalid multipart body: {}", err.body_text()))
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

impl ReportSubmission {
    async fn from_multipart(mut multipart: Multipart) -> AppResult<Self> {
        let mut photo = None;
        let mut fields: HashMap<String, String> = HashMap::new();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "photo" {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    photo = Some(PhotoUpload {
                        bytes: bytes.to_vec(),
                        content_type,
                        file_name,
                    });
                }
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                fields.insert(name, value);
            }
        }

        let mut errors = Vec::new();
        let mut take = |key: &str| fields.remove(key).filter(|v| !v.trim().is_empty());

        let location = match (take("location"), take("longitude"), take("latitude")) {
            (Some(raw), _, _) => serde_json::from_str::<GeoJsonPoint>(&raw)
                .map_err(|_| {
                    errors.push(FieldError::new(
                        "location",
                        "Location must be a GeoJSON point",
                    ))
                })
                .ok(),
            (None, Some(lng), Some(lat)) => match (lng.trim().parse(), lat.trim().parse()) {
                (Ok(longitude), Ok(latitude)) => Some(GeoJsonPoint {
                    kind: "Point".to_string(),
                    coordinates: vec![longitude, latitude],
                }),
                _ => {
                    errors.push(FieldError::new(
                        "location.coordinates",
                        "Coordinates must be numbers",
                    ));
                    None
                }
            },
            (None, None, None) => None,
            _ => {
                errors.push(FieldError::new(
                    "location.coordinates",
                    "Both longitude and latitude are required",
                ));
                None
            }
        };

        let manual_location = take("manualLocation").and_then(|raw| {
            serde_json::from_str::<ManualLocationBody>(&raw)
                .map_err(|_| {
                    errors.push(FieldError::new(
                        "manualLocation",
                        "Manual location must be an object with state, district, city and address",
                    ))
                })
                .ok()
        });

        let request = CreateReportRequest {
            title: take("title").unwrap_or_default(),
            description: take("description").unwrap_or_default(),
            category: take("category"),
            priority: take("priority"),
            location,
            manual_location,
            is_anonymous: take("isAnonymous").is_some_and(|v| parse_flag(&v)),
        };

        Ok(Self {
            request,
            photo,
            errors,
        })
    }
}

impl<S> FromRequest<S> for ReportSubmission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::invalid("body", e.body_text()))?;
            Self::from_multipart(multipart).await
        } else {
            let Json(request) = Json::<CreateReportRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::invalid("body", e.body_text()))?;
            Ok(Self {
                request,
                photo: None,
                errors: Vec::new(),
            })
        }
    }
}

/// Raw list query; every field is parsed here so bad values are reported
/// together instead of one at a time.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub status: Option<String>,
}

impl ReportListQuery {
    pub fn into_params(self) -> AppResult<ListParams> {
        let mut errors = Vec::new();
        let mut params = ListParams::default();

        if let Some(raw) = self.page.filter(|v| !v.is_empty()) {
            match raw.trim().parse::<u64>() {
                Ok(page) if page >= 1 => params.page = page,
                _ => errors.push(FieldError::new("page", "Page must be a positive integer")),
            }
        }
        if let Some(raw) = self.limit.filter(|v| !v.is_empty()) {
            match raw.trim().parse::<i64>() {
                Ok(limit) => params.limit = limit.clamp(1, MAX_PAGE_SIZE as i64) as u64,
                Err(_) => errors.push(FieldError::new(
                    "limit",
                    format!("Limit must be an integer between 1 and {MAX_PAGE_SIZE}"),
                )),
            }
        }

        let mut sort = ReportSort::default();
        if let Some(raw) = self.sort_by.filter(|v| !v.is_empty()) {
            match SortField::parse(raw.trim()) {
                Some(field) => sort.field = field,
                None => errors.push(FieldError::new(
                    "sortBy",
                    "sortBy must be one of createdAt, updatedAt, upvoteCount, title",
                )),
            }
        }
        if let Some(raw) = self.sort_order.filter(|v| !v.is_empty()) {
            match SortOrder::parse(raw.trim()) {
                Some(order) => sort.order = order,
                None => errors.push(FieldError::new("sortOrder", "sortOrder must be asc or desc")),
            }
        }
        params.sort = sort;

        if let Some(raw) = self.status.filter(|v| !v.is_empty()) {
            match ReportStatus::parse(&raw) {
                Some(status) => params.status = Some(status),
                None => errors.push(FieldError::new(
                    "status",
                    "Status must be one of Open, In Progress, Resolved, Closed",
                )),
            }
        }

        if !errors.is_empty() {
            return Err(AppError::ValidationFailed(errors));
        }
        Ok(params)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Open`, `In Progress`, `Resolved` or `Closed`
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportEnvelope {
    pub report: ReportResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportListResponse {
    pub reports: Vec<ReportResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpvoteResponse {
    pub report: ReportResponse,
    /// Whether the caller's upvote exists after the toggle
    pub upvoted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatsResponse {
    pub open: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub closed: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub text: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    params(
        ("page" = Option<u64>, Query, description = "Page number, from 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, 1-100"),
        ("sortBy" = Option<String>, Query, description = "createdAt, updatedAt, upvoteCount or title"),
        ("sortOrder" = Option<String>, Query, description = "asc or desc"),
        ("status" = Option<String>, Query, description = "Only reports in this status"),
    ),
    responses(
        (status = 200, description = "Page of reports", body = ReportListResponse),
        (status = 400, description = "Invalid query", body = AppError),
    ),
    tag = "reports"
)]
pub async fn list_reports(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    Query(query): Query<ReportListQuery>,
) -> AppResult<impl IntoResponse> {
    let params = query.into_params()?;
    let (reports, pagination) = ReportService::new(store, media).list(params).await?;

    Ok(ApiResponse::paginated(
        "Reports retrieved successfully",
        ReportListResponse {
            reports: reports.into_iter().map(ReportResponse::from).collect(),
        },
        pagination,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}",
    params(("id" = String, Path, description = "Report ID (UUID)")),
    responses(
        (status = 200, description = "Report found", body = ReportEnvelope),
        (status = 400, description = "Invalid ID format", body = AppError),
        (status = 404, description = "Report not found", body = AppError),
    ),
    tag = "reports"
)]
pub async fn get_report(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let report = ReportService::new(store, media).get(id).await?;

    Ok(ApiResponse::ok(
        "Report retrieved successfully",
        ReportEnvelope {
            report: report.into(),
        },
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    security(("jwt_token" = [])),
    request_body(
        content = CreateReportRequest,
        description = "JSON, or multipart/form-data with the same fields plus an optional `photo` (jpeg/png, at most 5MB)"
    ),
    responses(
        (status = 201, description = "Report created", body = ReportEnvelope),
        (status = 400, description = "Validation error", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
        (status = 500, description = "Storage service error", body = AppError),
    ),
    tag = "reports"
)]
pub async fn create_report(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    auth_user: AuthUser,
    submission: ReportSubmission,
) -> AppResult<impl IntoResponse> {
    let ReportSubmission {
        request,
        photo,
        mut errors,
    } = submission;
    let draft = request.into_draft(&mut errors);

    if !errors.is_empty() {
        // Fold in the field checks so the client sees everything at once.
        if let Err(AppError::ValidationFailed(more)) = draft.clone().validate(auth_user.user_id) {
            errors.extend(more);
        }
        return Err(AppError::ValidationFailed(errors));
    }

    let report = ReportService::new(store, media)
        .create(auth_user.user_id, draft, photo)
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(
            "Report created successfully",
            ReportEnvelope {
                report: report.into(),
            },
        ),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/reports/{id}",
    security(("jwt_token" = [])),
    params(("id" = String, Path, description = "Report ID (UUID)")),
    request_body = UpdateReportRequest,
    responses(
        (status = 200, description = "Report updated", body = ReportEnvelope),
        (status = 400, description = "Validation error or illegal status change", body = AppError),
        (status = 403, description = "Not the owner", body = AppError),
        (status = 404, description = "Report not found", body = AppError),
    ),
    tag = "reports"
)]
pub async fn update_report(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateReportRequest>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let report = ReportService::new(store, media)
        .update(
            id,
            auth_user.user_id,
            ReportUpdate {
                title: payload.title,
                description: payload.description,
                status: payload.status,
            },
        )
        .await?;

    Ok(ApiResponse::ok(
        "Report updated successfully",
        ReportEnvelope {
            report: report.into(),
        },
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reports/{id}",
    security(("jwt_token" = [])),
    params(("id" = String, Path, description = "Report ID (UUID)")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 403, description = "Not the owner", body = AppError),
        (status = 404, description = "Report not found", body = AppError),
    ),
    tag = "reports"
)]
pub async fn delete_report(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    ReportService::new(store, media)
        .delete(id, auth_user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/upvote",
    security(("jwt_token" = [])),
    params(("id" = String, Path, description = "Report ID (UUID)")),
    responses(
        (status = 200, description = "Upvote added or removed", body = UpvoteResponse),
        (status = 404, description = "Report not found", body = AppError),
    ),
    tag = "reports"
)]
pub async fn toggle_upvote(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let (report, upvoted) = ReportService::new(store, media)
        .toggle_upvote(id, auth_user.user_id)
        .await?;

    let message = if upvoted {
        "Report upvoted successfully"
    } else {
        "Upvote removed successfully"
    };
    Ok(ApiResponse::ok(
        message,
        UpvoteResponse {
            report: report.into(),
            upvoted,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/stats",
    responses(
        (status = 200, description = "Report counts per status", body = ReportStatsResponse),
    ),
    tag = "reports"
)]
pub async fn report_stats(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
) -> AppResult<impl IntoResponse> {
    let counts = ReportService::new(store, media).stats().await?;
    Ok(ApiResponse::ok(
        "Report statistics retrieved successfully",
        ReportStatsResponse {
            open: counts.open,
            in_progress: counts.in_progress,
            resolved: counts.resolved,
            closed: counts.closed,
            total: counts.total,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/categories",
    params(("text" = Option<String>, Query, description = "Free text to suggest categories for")),
    responses(
        (status = 200, description = "Known categories and suggestions", body = CategoriesResponse),
    ),
    tag = "reports"
)]
pub async fn report_categories(Query(query): Query<CategoryQuery>) -> impl IntoResponse {
    let suggestions = query
        .text
        .as_deref()
        .map(suggest_categories)
        .unwrap_or_default();
    ApiResponse::ok(
        "Categories retrieved successfully",
        CategoriesResponse {
            categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
            suggestions: suggestions.into_iter().map(String::from).collect(),
        },
    )
}

/// Upper bound for a whole `POST /reports` body: the photo plus form fields.
pub fn submission_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes + 64 * 1024
}
