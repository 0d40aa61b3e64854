use crate::error::{AppError, AppResult};
use crate::handlers::report::{ReportListQuery, ReportListResponse};
use crate::handlers::{AuthorSummary, ReportResponse};
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::media::MediaService;
use crate::services::report::ReportService;
use crate::services::user::{UserService, MAX_LEADERBOARD_SIZE};
use crate::store::Store;
use axum::{extract::Query, response::IntoResponse, Extension};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Raw so a non-numeric `limit` is reported in the usual error envelope.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<String>,
}

impl LeaderboardQuery {
    /// Out-of-range numbers are clamped later; only non-integers are errors.
    pub fn parsed_limit(&self) -> AppResult<Option<u64>> {
        match self.limit.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(|limit| Some(limit.max(1) as u64))
                .map_err(|_| {
                    AppError::invalid(
                        "limit",
                        format!("Limit must be an integer between 1 and {MAX_LEADERBOARD_SIZE}"),
                    )
                }),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub users: Vec<AuthorSummary>,
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me/reports",
    security(("jwt_token" = [])),
    params(
        ("page" = Option<u64>, Query, description = "Page number, from 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, 1-100"),
        ("sortBy" = Option<String>, Query, description = "createdAt, updatedAt, upvoteCount or title"),
        ("sortOrder" = Option<String>, Query, description = "asc or desc"),
        ("status" = Option<String>, Query, description = "Only reports in this status"),
    ),
    responses(
        (status = 200, description = "The caller's reports", body = ReportListResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "users"
)]
pub async fn my_reports(
    Extension(store): Extension<Store>,
    Extension(media): Extension<MediaService>,
    auth_user: AuthUser,
    Query(query): Query<ReportListQuery>,
) -> AppResult<impl IntoResponse> {
    let params = query.into_params()?;
    let (reports, pagination) = ReportService::new(store, media)
        .list_mine(auth_user.user_id, params)
        .await?;

    Ok(ApiResponse::paginated(
        "Your reports retrieved successfully",
        ReportListResponse {
            reports: reports.into_iter().map(ReportResponse::from).collect(),
        },
        pagination,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/leaderboard",
    params(("limit" = Option<u64>, Query, description = "Number of users, 1-100 (default 10)")),
    responses(
        (status = 200, description = "Users ranked by points", body = LeaderboardResponse),
        (status = 400, description = "Limit is not an integer", body = AppError),
    ),
    tag = "users"
)]
pub async fn leaderboard(
    Extension(store): Extension<Store>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.parsed_limit()?;
    let users = UserService::new(store).leaderboard(limit).await?;
    Ok(ApiResponse::ok(
        "Leaderboard retrieved successfully",
        LeaderboardResponse {
            users: users.iter().map(AuthorSummary::from).collect(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>) -> LeaderboardQuery {
        LeaderboardQuery {
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn leaderboard_limit_parsing() {
        assert_eq!(query(None).parsed_limit().unwrap(), None);
        assert_eq!(query(Some("")).parsed_limit().unwrap(), None);
        assert_eq!(query(Some(" 5 ")).parsed_limit().unwrap(), Some(5));
        assert_eq!(query(Some("-3")).parsed_limit().unwrap(), Some(1));

        let err = query(Some("abc")).parsed_limit().unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(ref e) if e[0].field == "limit"));
    }
}
