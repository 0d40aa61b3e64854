use crate::config::rate_limit::{RateLimitConfig, RateLimitRule};
use crate::handlers;
use crate::middleware::auth_middleware;
use axum::{extract::DefaultBodyLimit, middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

pub fn create_routes(rate_limits: &RateLimitConfig, max_upload_bytes: usize) -> Router {
    Router::new().nest("/api/v1", api_routes(rate_limits, max_upload_bytes))
}

fn api_routes(config: &RateLimitConfig, max_upload_bytes: usize) -> Router {
    let auth = auth_routes(config);
    let public_read = public_read_routes(config);
    let protected = protected_routes(config, max_upload_bytes)
        .layer(middleware::from_fn(auth_middleware));

    auth.merge(public_read).merge(protected)
}

/// Session endpoints share the stricter quota.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/signup", routing::post(handlers::auth::signup))
        .route("/auth/login", routing::post(handlers::auth::login))
        .route("/auth/refresh", routing::post(handlers::auth::refresh))
        .route("/auth/logout", routing::post(handlers::auth::logout));

    with_optional_rate_limit(router, config.enabled, config.auth)
}

fn public_read_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/reports", routing::get(handlers::report::list_reports))
        .route("/reports/stats", routing::get(handlers::report::report_stats))
        .route(
            "/reports/categories",
            routing::get(handlers::report::report_categories),
        )
        .route("/reports/{id}", routing::get(handlers::report::get_report))
        .route(
            "/users/leaderboard",
            routing::get(handlers::user::leaderboard),
        );

    with_optional_rate_limit(router, config.enabled, config.general)
}

fn protected_routes(config: &RateLimitConfig, max_upload_bytes: usize) -> Router {
    let router = Router::new()
        .route("/auth/profile", routing::get(handlers::auth::profile))
        .route(
            "/reports",
            routing::post(handlers::report::create_report).layer(DefaultBodyLimit::max(
                handlers::report::submission_body_limit(max_upload_bytes),
            )),
        )
        .route(
            "/reports/{id}",
            routing::patch(handlers::report::update_report)
                .delete(handlers::report::delete_report),
        )
        .route(
            "/reports/{id}/upvote",
            routing::post(handlers::report::toggle_upvote),
        )
        .route("/users/me/reports", routing::get(handlers::user::my_reports));

    with_optional_rate_limit(router, config.enabled, config.general)
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    // `per_second` is the interval, in seconds, after which one cell is replenished.
    match GovernorConfigBuilder::default()
        .per_second(rule.replenish_seconds)
        .burst_size(rule.burst_size)
        .finish()
    {
        Some(governor_conf) => router.layer(GovernorLayer::new(governor_conf)),
        None => {
            tracing::error!(
                "Ignoring rate limit with zero interval or burst: {:?}",
                rule
            );
            router
        }
    }
}
