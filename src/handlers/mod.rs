pub mod auth;
pub mod health;
pub mod report;
pub mod user;

use crate::error::{AppError, AppResult};
use crate::services::points::badges_for;
use crate::services::report::ReportDetails;
use crate::store::{ManualLocation, ReportLocation, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Path ids are UUIDs on every backend.
pub(crate) fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::invalid("id", "Invalid ID format"))
}

/// Account as shown to its owner. The password hash never leaves the store.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub points: i64,
    pub badges: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            badges: badges_for(user.points).into_iter().map(String::from).collect(),
            points: user.points,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Public view of another user: no email.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: String,
    pub points: i64,
    pub badges: Vec<String>,
}

impl From<&UserRecord> for AuthorSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            points: user.points,
            badges: badges_for(user.points).into_iter().map(String::from).collect(),
        }
    }
}

/// GeoJSON point, `[longitude, latitude]`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoJsonPoint {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

fn point_type() -> String {
    "Point".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ManualLocationBody {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
}

impl From<ManualLocationBody> for ManualLocation {
    fn from(body: ManualLocationBody) -> Self {
        Self {
            state: body.state,
            district: body.district,
            city: body.city,
            address: body.address,
        }
    }
}

/// Same shape whichever store the report came from: `location` is a GeoJSON
/// point or null, `manualLocation` the address form or null.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub location: Option<GeoJsonPoint>,
    pub manual_location: Option<ManualLocationBody>,
    pub photo_url: Option<String>,
    pub upvote_count: i64,
    pub is_anonymous: bool,
    /// Omitted for anonymous reports.
    pub author: Option<AuthorSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReportDetails> for ReportResponse {
    fn from(details: ReportDetails) -> Self {
        let ReportDetails { report, author } = details;
        let (location, manual_location) = match report.location {
            ReportLocation::Point(point) => (
                Some(GeoJsonPoint {
                    kind: point_type(),
                    coordinates: vec![point.longitude, point.latitude],
                }),
                None,
            ),
            ReportLocation::Manual(manual) => (
                None,
                Some(ManualLocationBody {
                    state: manual.state,
                    district: manual.district,
                    city: manual.city,
                    address: manual.address,
                }),
            ),
        };
        let author = if report.is_anonymous {
            None
        } else {
            author.as_ref().map(AuthorSummary::from)
        };

        Self {
            id: report.id,
            title: report.title,
            description: report.description,
            category: report.category,
            priority: report.priority.as_str().to_string(),
            status: report.status.as_str().to_string(),
            location,
            manual_location,
            photo_url: report.photo_url,
            upvote_count: report.upvote_count,
            is_anonymous: report.is_anonymous,
            author,
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GeoPoint, NewReport, Priority};

    fn details(is_anonymous: bool, location: ReportLocation) -> ReportDetails {
        let author = UserRecord {
            id: Uuid::new_v4(),
            username: "reporter".to_string(),
            email: "reporter@example.com".to_string(),
            password_hash: "secret-hash".to_string(),
            points: 60,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let report = NewReport {
            author_id: author.id,
            title: "Broken streetlight".to_string(),
            description: "Dark since Monday".to_string(),
            category: "Streetlight".to_string(),
            priority: Priority::Low,
            location,
            photo_url: None,
            is_anonymous,
        }
        .into_record(Utc::now());
        ReportDetails {
            report,
            author: Some(author),
        }
    }

    #[test]
    fn point_location_serializes_as_geojson() {
        let body = serde_json::to_value(ReportResponse::from(details(
            false,
            ReportLocation::Point(GeoPoint {
                longitude: 77.59,
                latitude: 12.97,
            }),
        )))
        .unwrap();
        assert_eq!(body["location"]["type"], "Point");
        assert_eq!(body["location"]["coordinates"][0], 77.59);
        assert!(body["manualLocation"].is_null());
        assert_eq!(body["upvoteCount"], 0);
        assert_eq!(body["status"], "Open");
        assert_eq!(body["author"]["badges"][1], "Contributor");
        assert!(body["author"].get("email").is_none());
    }

    #[test]
    fn anonymous_reports_hide_author() {
        let body = serde_json::to_value(ReportResponse::from(details(
            true,
            ReportLocation::Manual(ManualLocation {
                state: "Karnataka".to_string(),
                district: "Bengaluru Urban".to_string(),
                city: "Bengaluru".to_string(),
                address: "MG Road".to_string(),
            }),
        )))
        .unwrap();
        assert!(body["author"].is_null());
        assert!(body["location"].is_null());
        assert_eq!(body["manualLocation"]["city"], "Bengaluru");
    }

    #[test]
    fn user_response_never_carries_hash() {
        let user = details(false, ReportLocation::Point(GeoPoint { longitude: 0.0, latitude: 0.0 }))
            .author
            .unwrap();
        let body = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(body.get("passwordHash").is_none());
        assert_eq!(body["badges"], serde_json::json!(["Starter", "Contributor"]));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(parse_id("not-a-uuid").is_err());
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
