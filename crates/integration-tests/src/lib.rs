//! Integration test harness for `BankID` Gateway.
//!
//! [`FakeAuthority`] stands in for the authority's relying-party API on a
//! local `mockito` server. Tests flip what `collect` reports while an order is
//! being polled and count how often each endpoint was hit.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bankid-gateway-integration-tests
//! ```
//!
//! No database is needed: service tests use the in-memory user store, and
//! route tests only exercise paths that never reach `PostgreSQL`.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use bankid_gateway_server::bankid::{BankIdClient, HttpTransport};
use bankid_gateway_server::config::BankIdConfig;
use bankid_gateway_server::db::MemoryUserStore;
use bankid_gateway_server::services::AuthService;

/// API root below the mock server's URL.
pub const API_PATH: &str = "/rp/v6.0";

/// Order reference the fake authority hands out.
pub const ORDER_REF: &str = "131daac9-16c6-4618-beb0-365768f37288";

/// Service type every scenario test drives.
pub type TestAuthService = AuthService<HttpTransport, MemoryUserStore>;

/// Scripted stand-in for the authority.
pub struct FakeAuthority {
    server: mockito::ServerGuard,
    collect_answer: Arc<Mutex<Value>>,
    collect_hits: Arc<AtomicUsize>,
    cancel_hits: Arc<AtomicUsize>,
}

impl FakeAuthority {
    /// Start a server that accepts `auth`, reports `pending` on `collect`,
    /// and accepts `cancel`.
    pub async fn start() -> Self {
        let mut server = mockito::Server::new_async().await;
        let collect_answer = Arc::new(Mutex::new(pending_json("outstandingTransaction")));
        let collect_hits = Arc::new(AtomicUsize::new(0));
        let cancel_hits = Arc::new(AtomicUsize::new(0));

        server
            .mock("POST", format!("{API_PATH}/auth").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(auth_json().to_string())
            .create_async()
            .await;

        let answer = Arc::clone(&collect_answer);
        let hits = Arc::clone(&collect_hits);
        server
            .mock("POST", format!("{API_PATH}/collect").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                answer.lock().unwrap().to_string().into_bytes()
            })
            .create_async()
            .await;

        let hits = Arc::clone(&cancel_hits);
        server
            .mock("POST", format!("{API_PATH}/cancel").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                b"{}".to_vec()
            })
            .create_async()
            .await;

        Self {
            server,
            collect_answer,
            collect_hits,
            cancel_hits,
        }
    }

    /// Start a server that refuses every `auth` with `errorCode`.
    pub async fn refusing(status: usize, error_code: &str) -> Self {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", format!("{API_PATH}/auth").as_str())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "errorCode": error_code, "details": "Refused by test authority" })
                    .to_string(),
            )
            .create_async()
            .await;

        Self {
            server,
            collect_answer: Arc::new(Mutex::new(Value::Null)),
            collect_hits: Arc::new(AtomicUsize::new(0)),
            cancel_hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every later `collect` with `answer`.
    pub fn set_collect(&self, answer: Value) {
        *self.collect_answer.lock().unwrap() = answer;
    }

    /// Report the order as complete for the fixture user.
    pub fn complete(&self) {
        self.set_collect(json!({
            "orderRef": ORDER_REF,
            "status": "complete",
            "completionData": completion_json("198001011234", "Jane", "Doe"),
        }));
    }

    /// Report the order as failed with `hint_code`.
    pub fn fail(&self, hint_code: &str) {
        self.set_collect(json!({
            "orderRef": ORDER_REF,
            "status": "failed",
            "hintCode": hint_code,
        }));
    }

    pub fn collect_hits(&self) -> usize {
        self.collect_hits.load(Ordering::SeqCst)
    }

    pub fn cancel_hits(&self) -> usize {
        self.cancel_hits.load(Ordering::SeqCst)
    }

    /// API root for clients of this server.
    pub fn api_url(&self) -> String {
        format!("{}{API_PATH}", self.server.url())
    }

    /// Plain-HTTP transport pointed at this server.
    pub fn transport(&self) -> HttpTransport {
        HttpTransport::with_client(&self.api_url(), reqwest::Client::new())
    }

    /// Service with an empty in-memory user store.
    pub fn service(&self, config: &BankIdConfig) -> TestAuthService {
        self.service_with_store(config, MemoryUserStore::new())
    }

    /// Service over an existing store, to inspect it afterwards.
    pub fn service_with_store(
        &self,
        config: &BankIdConfig,
        store: MemoryUserStore,
    ) -> TestAuthService {
        let client = BankIdClient::new(self.transport(), config.order_ttl);
        AuthService::new(client, store, config)
    }
}

/// Timing fast enough for tests that run on the real clock.
pub fn fast_config() -> BankIdConfig {
    BankIdConfig {
        poll_interval: Duration::from_millis(20),
        order_ttl: Duration::from_secs(30),
        max_transport_failures: 3,
        session_retention: Duration::from_secs(30),
        ..BankIdConfig::default()
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn auth_json() -> Value {
    json!({
        "orderRef": ORDER_REF,
        "autoStartToken": "7c40b5c9-fa74-49cf-b98c-bfe651f9a7c6",
        "qrStartToken": "67df3917-fa0d-44e5-b327-edcc928297f8",
        "qrStartSecret": "d28db9a7-4cde-429e-a983-359be676944c"
    })
}

pub fn pending_json(hint_code: &str) -> Value {
    json!({
        "orderRef": ORDER_REF,
        "status": "pending",
        "hintCode": hint_code,
    })
}

pub fn completion_json(personal_number: &str, given_name: &str, surname: &str) -> Value {
    json!({
        "user": {
            "personalNumber": personal_number,
            "name": format!("{given_name} {surname}"),
            "givenName": given_name,
            "surname": surname
        },
        "device": { "ipAddress": "192.0.2.10", "uhi": "OZvYM9VvyiAmG7NA5jU5zqGcVpo=" },
        "cert": { "notBefore": "1700000000000", "notAfter": "4102444800000" },
        "signature": "PD94bWwgdmVyc2lvbj0iMS4wIj8+",
        "ocspResponse": "MIIHfgoBAKCCB3cw"
    })
}
