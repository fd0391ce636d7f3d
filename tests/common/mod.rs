#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use pharmacy_online::{
    app_router,
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{category, user},
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        accounts::RegisterRequest,
        catalog::{CategoryRequest, CreateMedicineRequest, MedicineResponse},
    },
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "Zq4Lm8Xv2Nc7Rt1Yb5Hs9Jk3Pw6Ge0Fu4Ta8Xo2Mi6Ly0Bz5Qv9Cn3Ws7Dr1Ek5Hp";

/// A signed-in account usable in requests
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

/// Application backed by a fresh SQLite file, wired with the real router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub auth_service: Arc<AuthService>,
    pub staff: TestUser,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for test database");
        let url = format!(
            "sqlite://{}?mode=rwc",
            db_dir.path().join("pharmacy.db").display()
        );

        let mut cfg = AppConfig::new(
            url,
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            auth_service.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = app_router(state.clone(), auth_service.clone());

        let staff_account = state
            .services
            .accounts
            .create_user(registration("pharmacist"), true)
            .await
            .expect("seed staff account");
        let staff = TestUser {
            id: staff_account.id,
            username: staff_account.username.clone(),
            token: auth_service
                .generate_token(&staff_account)
                .expect("staff token")
                .access_token,
        };

        Self {
            router,
            state,
            auth_service,
            staff,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Registers a customer through the service layer
    pub async fn customer(&self, username: &str) -> TestUser {
        let auth = self
            .state
            .services
            .accounts
            .register(registration(username))
            .await
            .expect("register customer");
        TestUser {
            id: auth.user.id,
            username: auth.user.username,
            token: auth.token.access_token,
        }
    }

    pub async fn user(&self, id: Uuid) -> user::Model {
        self.state
            .services
            .accounts
            .get_user(id)
            .await
            .expect("user exists")
    }

    pub async fn seed_category(&self, name: &str) -> category::Model {
        self.state
            .services
            .catalog
            .create_category(CategoryRequest {
                name: name.to_string(),
                description: None,
            })
            .await
            .expect("seed category")
    }

    /// Creates an available medicine with the given opening stock
    pub async fn seed_medicine(
        &self,
        category_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> MedicineResponse {
        self.state
            .services
            .catalog
            .create_medicine(medicine_request(category_id, name, price, stock), self.staff.id)
            .await
            .expect("seed medicine")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
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

    /// Adds one unit of a medicine to the user's cart over HTTP
    pub async fn add_to_cart(&self, user: &TestUser, medicine_id: Uuid) -> Response {
        self.request(
            Method::POST,
            "/api/v1/cart/items",
            Some(serde_json::json!({ "medicine_id": medicine_id })),
            Some(&user.token),
        )
        .await
    }

    pub async fn checkout(&self, user: &TestUser) -> Response {
        self.request(Method::POST, "/api/v1/checkout", None, Some(&user.token))
            .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn registration(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: "correct horse battery".to_string(),
        first_name: String::new(),
        last_name: String::new(),
    }
}

pub fn medicine_request(
    category_id: Uuid,
    name: &str,
    price: Decimal,
    stock: i32,
) -> CreateMedicineRequest {
    CreateMedicineRequest {
        name: name.to_string(),
        description: format!("{} tablets", name),
        category_id,
        price,
        requires_prescription: false,
        active_ingredient: name.to_lowercase(),
        dosage: "500mg".to_string(),
        manufacturer: "Generic Labs".to_string(),
        expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date"),
        stock_quantity: stock,
        minimum_stock: 10,
        is_available: true,
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("response body bytes")
        .to_bytes()
        .to_vec()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal serialized as a JSON string or number
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}
