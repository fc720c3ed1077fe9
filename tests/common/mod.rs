#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use marketplace_payments::config::PaystackConfig;
use marketplace_payments::engine::ReconciliationEngine;
use marketplace_payments::mailer::{Receipt, ReceiptMailer};
use marketplace_payments::models::{PaymentRecord, PaymentStatus, StatusUpdate};
use marketplace_payments::paystack::PaystackClient;
use marketplace_payments::routes::{router, AppState};
use marketplace_payments::store::{InMemoryPaymentStore, PaymentStore, StoreError};

pub const SECRET: &str = "sk_test_fake_secret";
pub const CALLBACK_URL: &str = "https://shop.example.com/payment/callback";

// ============================================================================
// FAKE PAYSTACK
// ============================================================================

#[derive(Clone, Debug)]
pub enum InitBehavior {
    Accept,
    Reject { status: u16, message: String },
    Hang(Duration),
    Garbage,
}

#[derive(Clone)]
pub struct FakePaystackState {
    init_behavior: Arc<Mutex<InitBehavior>>,
    initialize_calls: Arc<Mutex<Vec<HashMap<String, String>>>>,
    verify_responses: Arc<Mutex<HashMap<String, (u16, Value)>>>,
    verify_calls: Arc<AtomicUsize>,
}

pub struct FakePaystack {
    pub base_url: String,
    state: FakePaystackState,
}

impl FakePaystack {
    pub async fn spawn() -> Self {
        let state = FakePaystackState {
            init_behavior: Arc::new(Mutex::new(InitBehavior::Accept)),
            initialize_calls: Arc::new(Mutex::new(Vec::new())),
            verify_responses: Arc::new(Mutex::new(HashMap::new())),
            verify_calls: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/transaction/initialize", post(fake_initialize))
            .route("/transaction/verify/:reference", get(fake_verify))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakePaystack {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_init_behavior(&self, behavior: InitBehavior) {
        *self.state.init_behavior.lock().unwrap() = behavior;
    }

    pub fn initialize_calls(&self) -> Vec<HashMap<String, String>> {
        self.state.initialize_calls.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.state.verify_calls.load(Ordering::SeqCst)
    }

    /// Makes `GET /transaction/verify/{reference}` report `status`.
    pub fn set_transaction(&self, reference: &str, status: &str, amount: i64, email: &str) {
        let body = json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "reference": reference,
                "status": status,
                "amount": amount,
                "currency": "NGN",
                "paid_at": "2026-01-05T10:00:00.000Z",
                "gateway_response": if status == "success" { "Successful" } else { "Declined" },
                "customer": { "email": email }
            }
        });
        self.set_verify_response(reference, 200, body);
    }

    pub fn set_verify_response(&self, reference: &str, status_code: u16, body: Value) {
        self.state
            .verify_responses
            .lock()
            .unwrap()
            .insert(reference.to_string(), (status_code, body));
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", SECRET))
        .unwrap_or(false)
}

fn invalid_key() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "status": false, "message": "Invalid key" })),
    )
        .into_response()
}

async fn fake_initialize(
    State(state): State<FakePaystackState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return invalid_key();
    }
    state.initialize_calls.lock().unwrap().push(form.clone());
    let reference = form.get("reference").cloned().unwrap_or_default();
    let accepted = Json(json!({
        "status": true,
        "message": "Authorization URL created",
        "data": {
            "authorization_url": format!("https://checkout.paystack.com/{}", reference),
            "access_code": "ac_test",
            "reference": reference
        }
    }));

    let behavior = state.init_behavior.lock().unwrap().clone();
    match behavior {
        InitBehavior::Accept => accepted.into_response(),
        InitBehavior::Reject { status, message } => (
            StatusCode::from_u16(status).unwrap(),
            Json(json!({ "status": false, "message": message })),
        )
            .into_response(),
        InitBehavior::Hang(duration) => {
            tokio::time::sleep(duration).await;
            accepted.into_response()
        }
        InitBehavior::Garbage => (StatusCode::OK, "<html>upstream error</html>").into_response(),
    }
}

async fn fake_verify(
    State(state): State<FakePaystackState>,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return invalid_key();
    }
    state.verify_calls.fetch_add(1, Ordering::SeqCst);
    let configured = state.verify_responses.lock().unwrap().get(&reference).cloned();
    match configured {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), Json(body)).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": false, "message": "Transaction reference not found" })),
        )
            .into_response(),
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Receipt>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Receipt> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptMailer for RecordingMailer {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), String> {
        self.sent.lock().unwrap().push(receipt.clone());
        if self.fail {
            return Err("smtp relay refused connection".to_string());
        }
        Ok(())
    }
}

/// A store whose backend is always down.
pub struct UnavailableStore;

#[async_trait]
impl PaymentStore for UnavailableStore {
    async fn create_or_get(&self, _: &str, _: &str, _: i64) -> Result<PaymentRecord, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn append_log_and_set_status(
        &self,
        _: &str,
        _: PaymentStatus,
        _: &str,
    ) -> Result<StatusUpdate, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn get_by_gateway_reference(&self, _: &str) -> Result<Option<PaymentRecord>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub paystack: FakePaystack,
    pub store: InMemoryPaymentStore,
    pub mailer: Arc<RecordingMailer>,
    pub state: Arc<AppState>,
}

pub fn paystack_config(base_url: &str) -> PaystackConfig {
    let mut config = PaystackConfig::for_base_url(base_url, SECRET);
    config.connect_timeout = Duration::from_secs(2);
    config.request_timeout = Duration::from_millis(500);
    config
}

pub async fn harness() -> Harness {
    harness_with(RecordingMailer::default()).await
}

pub async fn harness_with(mailer: RecordingMailer) -> Harness {
    let paystack = FakePaystack::spawn().await;
    let store = InMemoryPaymentStore::new();
    let mailer = Arc::new(mailer);
    let client = PaystackClient::new(&paystack_config(&paystack.base_url)).unwrap();

    let engine = ReconciliationEngine::new(
        Arc::new(client),
        Arc::new(store.clone()),
        mailer.clone(),
        CALLBACK_URL,
        "NGN",
    );
    let state = Arc::new(AppState::new(engine, SECRET));

    Harness {
        paystack,
        store,
        mailer,
        state,
    }
}

impl Harness {
    pub fn app(&self) -> Router {
        router(self.state.clone())
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        self.state.engine().unwrap()
    }

    pub async fn record(&self, gateway_reference: &str) -> PaymentRecord {
        self.store
            .get_by_gateway_reference(gateway_reference)
            .await
            .unwrap()
            .expect("payment record should exist")
    }

    /// Runs a checkout through the HTTP surface and returns the response.
    pub async fn initialize(&self, body: Value) -> (StatusCode, Value) {
        send(
            self.app(),
            Request::builder()
                .method("POST")
                .uri("/paystack/initialize")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn verify(&self, reference: &str) -> (StatusCode, Value) {
        send(
            self.app(),
            Request::builder()
                .uri(format!("/paystack/verify?reference={}", reference))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
    (status, body)
}
