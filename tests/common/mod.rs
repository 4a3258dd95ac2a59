use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use posync_api::{
    auth::Claims,
    config::AppConfig,
    db,
    entities::{business, product, user_profile, user_profile::UserRole},
    events::{self, EventSender},
    handlers::AppServices,
    services::images::{FsImageStore, ImageStore},
    AppState,
};

/// Signing secret for test tokens. Long enough to pass config validation.
const TEST_JWT_SECRET: &str =
    "integration-test-signing-secret-0123456789-abcdefghijklmnopqrstuvwxyz";

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database. Seeds two businesses so tenant isolation is testable:
/// business one with an admin and a worker, business two with its own admin.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub business_id: i32,
    #[allow(dead_code)]
    pub other_business_id: i32,
    pub admin_id: Uuid,
    pub worker_id: Uuid,
    #[allow(dead_code)]
    pub other_admin_id: Uuid,
    _db_dir: tempfile::TempDir,
    _media_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create test db dir");
        let media_dir = tempfile::tempdir().expect("create test media dir");
        let database_url = format!(
            "sqlite://{}?mode=rwc",
            db_dir.path().join("posync_test.db").display()
        );

        let mut cfg = AppConfig::new(
            database_url,
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.media_dir = media_dir.path().display().to_string();
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let image_store: Arc<dyn ImageStore> = Arc::new(FsImageStore::new(media_dir.path()));
        let services = AppServices::new(db_arc.clone(), event_sender.clone(), image_store);

        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            event_sender,
            services,
        };

        let business_id = seed_business(&db_arc, "Cafe Uno").await;
        let other_business_id = seed_business(&db_arc, "Kiosko Dos").await;
        let admin_id = seed_profile(&db_arc, business_id, UserRole::Admin, "Ana Admin").await;
        let worker_id = seed_profile(&db_arc, business_id, UserRole::Worker, "Willa Worker").await;
        let other_admin_id =
            seed_profile(&db_arc, other_business_id, UserRole::Admin, "Omar Other").await;

        let router = Router::new()
            .nest("/api/v1", posync_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            business_id,
            other_business_id,
            admin_id,
            worker_id,
            other_admin_id,
            _db_dir: db_dir,
            _media_dir: media_dir,
            _event_task: event_task,
        }
    }

    /// Mint a bearer token for the given actor, signed the way the server
    /// validates it.
    pub fn token_for(&self, actor_id: Uuid) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: actor_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            nbf: now.timestamp() - 5,
            iss: self.state.config.auth_issuer.clone(),
            aud: self.state.config.auth_audience.clone(),
        };

        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .expect("encode test token")
    }

    /// Send a request against the router, acting as `actor` when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        actor: Option<Uuid>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(actor_id) = actor {
            builder = builder.header("authorization", format!("Bearer {}", self.token_for(actor_id)));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request and decode the JSON body, asserting the status first.
    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        actor: Option<Uuid>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let response = self.request(method, uri, actor, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        assert_eq!(
            status,
            expected,
            "unexpected status for {uri}: {}",
            String::from_utf8_lossy(&bytes)
        );
        if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is not json")
        }
    }

    /// Seed an active product directly, returning its server id.
    #[allow(dead_code)]
    pub async fn seed_product(
        &self,
        business_id: i32,
        local_id: i32,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            business_id: Set(business_id),
            local_id: Set(local_id),
            name: Set(name.to_string()),
            description: Set(None),
            qr_code: Set(None),
            price: Set(price),
            stock: Set(stock),
            image_path: Set(None),
            active: Set(true),
            updated_at: Set(Utc::now()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests");
        id
    }

    /// Current stock of a product, read straight from the database.
    #[allow(dead_code)]
    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product stock")
            .expect("product row exists")
            .stock
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Parse a decimal field out of a JSON response for numeric comparison.
/// The database round trip does not preserve trailing zeros, so asserting
/// on the exact string form would couple tests to the backend.
#[allow(dead_code)]
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("expected a decimal string, got {value}"))
}

async fn seed_business(db: &sea_orm::DatabaseConnection, name: &str) -> i32 {
    business::ActiveModel {
        name: Set(name.to_string()),
        active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed business for tests")
    .id
}

async fn seed_profile(
    db: &sea_orm::DatabaseConnection,
    business_id: i32,
    role: UserRole,
    display_name: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    user_profile::ActiveModel {
        id: Set(id),
        business_id: Set(business_id),
        role: Set(role),
        display_name: Set(display_name.to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed user profile for tests");
    id
}
