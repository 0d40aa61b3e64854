#![allow(dead_code)]

use civic_reporter::config::app::{AppConfig, Environment};
use civic_reporter::config::database::{BackendKind, DatabaseConfig, DynamoConfig};
use civic_reporter::config::jwt::JwtConfig;
use civic_reporter::config::media::DEFAULT_MAX_UPLOAD_BYTES;
use civic_reporter::config::rate_limit::RateLimitConfig;
use civic_reporter::services::media::{LocalMediaStorage, MediaService};
use civic_reporter::utils::cookie::CookieConfig;
use civic_reporter::{build_app, AppContext, Store};
use reqwest::Client;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tempfile::TempDir;

static INIT: Once = Once::new();
static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub const TEST_PASSWORD: &str = "Secret123";

/// Smallest valid JPEG prefix; enough for the magic-byte check.
pub const JPEG_BYTES: [u8; 8] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];

fn init_env() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        // Keep bcrypt cheap; the value is read once per process.
        std::env::set_var("BCRYPT_COST", "4");
    });
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "integration_test_secret_that_is_at_least_32_characters_long".to_string(),
        refresh_secret: "integration_test_refresh_secret_at_least_32_characters".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "civic-reporter-api".to_string(),
        audience: "civic-reporter-client".to_string(),
    }
}

pub struct TestApp {
    pub addr: String,
    pub store: Store,
    pub client: Client,
    pub jwt: JwtConfig,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }

    /// A client that keeps the refresh cookie between requests.
    pub fn cookie_client(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build cookie client")
    }
}

/// In-memory store per app unless `TEST_DATABASE_TYPE=postgres` and
/// `TEST_DATABASE_URL` point at a database.
async fn test_store() -> Store {
    let wants_postgres = std::env::var("TEST_DATABASE_TYPE")
        .ok()
        .and_then(|t| BackendKind::parse(&t))
        == Some(BackendKind::Postgres);

    match std::env::var("TEST_DATABASE_URL") {
        Ok(url) if wants_postgres => {
            let config = DatabaseConfig {
                backend: BackendKind::Postgres,
                url: Some(url),
                max_connections: 5,
                min_connections: 1,
                dynamodb: DynamoConfig {
                    region: "us-east-1".to_string(),
                    endpoint_url: None,
                    table_prefix: "civic_test_".to_string(),
                    create_tables: false,
                },
            };
            Store::connect(&config)
                .await
                .expect("Failed to connect to test database")
        }
        _ => Store::memory(),
    }
}

pub async fn spawn_app() -> TestApp {
    init_env();

    let store = test_store().await;
    let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");
    let jwt = test_jwt_config();

    let ctx = AppContext {
        config: AppConfig {
            environment: Environment::Test,
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: "*".to_string(),
            json_logs: false,
        },
        store: store.clone(),
        jwt: jwt.clone(),
        cookies: CookieConfig::default(),
        media: MediaService::new(
            Arc::new(LocalMediaStorage::new(upload_dir.path())),
            DEFAULT_MAX_UPLOAD_BYTES,
        ),
        rate_limits: RateLimitConfig::disabled(),
        upload_dir: Some(upload_dir.path().to_string_lossy().into_owned()),
    };
    let app = build_app(ctx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        store,
        client: Client::new(),
        jwt,
        upload_dir,
    }
}

pub struct TestUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub token: String,
}

/// Sign up a fresh user with a unique name.
pub async fn create_test_user(app: &TestApp, username_prefix: &str) -> TestUser {
    let counter = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let username = format!("{}_{}{}", username_prefix, counter, &unique[..6]);
    let email = format!("{}@test.com", username);

    let resp = app
        .client
        .post(app.url("/auth/signup"))
        .json(&json!({
            "username": username,
            "email": email,
            "password": TEST_PASSWORD,
        }))
        .send()
        .await
        .expect("Failed to sign up user");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Failed to parse signup response");
    assert_eq!(status, 201, "signup of '{}' failed: {}", username, body);

    TestUser {
        id: body["data"]["user"]["id"]
            .as_str()
            .expect("signup response missing user id")
            .to_string(),
        username,
        email: email.to_lowercase(),
        token: body["data"]["accessToken"]
            .as_str()
            .expect("signup response missing access token")
            .to_string(),
    }
}

pub fn report_body(title: &str) -> Value {
    json!({
        "title": title,
        "description": "Needs fixing soon",
        "category": "Road",
        "priority": "High",
        "location": { "type": "Point", "coordinates": [77.5946, 12.9716] },
    })
}

/// Create a report with a JSON body and return its `data.report` object.
pub async fn create_report(app: &TestApp, token: &str, title: &str) -> Value {
    let resp = app
        .client
        .post(app.url("/reports"))
        .bearer_auth(token)
        .json(&report_body(title))
        .send()
        .await
        .expect("Failed to create report");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Failed to parse report response");
    assert_eq!(status, 201, "report creation failed: {}", body);
    body["data"]["report"].clone()
}
