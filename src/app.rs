use crate::config::{app::AppConfig, jwt::JwtConfig, rate_limit::RateLimitConfig};
use crate::handlers;
use crate::routes;
use crate::services::media::MediaService;
use crate::store::Store;
use crate::utils::cookie::CookieConfig;
use axum::{extract::Extension, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        // Auth
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::profile,
        // Reports
        handlers::report::list_reports,
        handlers::report::report_stats,
        handlers::report::report_categories,
        handlers::report::get_report,
        handlers::report::create_report,
        handlers::report::update_report,
        handlers::report::delete_report,
        handlers::report::toggle_upvote,
        // Users
        handlers::user::my_reports,
        handlers::user::leaderboard,
    ),
    components(
        schemas(
            crate::error::AppError,
            crate::error::FieldError,
            crate::response::PaginationMeta,
            handlers::UserResponse,
            handlers::AuthorSummary,
            handlers::GeoJsonPoint,
            handlers::ManualLocationBody,
            handlers::ReportResponse,
            handlers::health::HealthResponse,
            handlers::auth::SignupRequest,
            handlers::auth::LoginRequest,
            handlers::auth::AuthResponse,
            handlers::auth::TokenResponse,
            handlers::report::CreateReportRequest,
            handlers::report::UpdateReportRequest,
            handlers::report::ReportEnvelope,
            handlers::report::ReportListResponse,
            handlers::report::UpvoteResponse,
            handlers::report::ReportStatsResponse,
            handlers::report::CategoriesResponse,
            handlers::user::LeaderboardResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service status"),
        (name = "auth", description = "Signup, login and token refresh"),
        (name = "reports", description = "Civic issue reports and upvotes"),
        (name = "users", description = "Per-user views and the leaderboard"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Everything a running server shares across requests, built once at start-up.
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub store: Store,
    pub jwt: JwtConfig,
    pub cookies: CookieConfig,
    pub media: MediaService,
    pub rate_limits: RateLimitConfig,
    /// Served at `/uploads` when photos are kept on local disk.
    pub upload_dir: Option<String>,
}

fn build_cors_layer(origins: &str) -> CorsLayer {
    use axum::http::{header, HeaderValue, Method};

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.trim() == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        // The refresh cookie only crosses origins with credentials allowed.
        cors.allow_origin(origins).allow_credentials(true)
    }
}

pub fn build_app(ctx: AppContext) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(routes::create_routes(
            &ctx.rate_limits,
            ctx.media.max_upload_bytes(),
        ))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    if let Some(dir) = &ctx.upload_dir {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.layer(Extension(ctx.store))
        .layer(Extension(ctx.jwt))
        .layer(Extension(ctx.cookies))
        .layer(Extension(ctx.media))
        .layer(Extension(ctx.config.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&ctx.config.cors_origins))
}
