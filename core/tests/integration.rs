//! End-to-end tests against the live mock backend.
//!
//! # Design
//! Starts the mock server on a random port, then drives the real
//! `HttpClient` (reqwest transport, default interceptors) through it. This
//! covers the parts a scripted transport cannot: real status lines, real
//! multipart encoding, and DTO drift between the client and the backend.

use std::sync::Arc;
use std::time::Duration;

use paydash_core::session::{REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY};
use paydash_core::types::{
    order_status, pay_way, BatchAction, BatchUpdateRequest, CreateAppRequest, CreatePaymentRequest,
    LoginCredentials, OrderQuery, PaymentFilter, StatsQuery, UpdateAppRequest,
};
use paydash_core::{
    ApiResponse, AppApi, AuthApi, ClientConfig, ErrorKind, ExportFormat, FormData, HttpClient,
    MemorySessionStore, OrderApi, Params, PaymentApi, RequestConfig, Session, SessionStore,
    SESSION_EXPIRED_MESSAGE,
};
use serde_json::Value;

async fn start_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    format!("http://{addr}")
}

fn default_client(base_url: &str, store: Arc<MemorySessionStore>) -> HttpClient {
    let config = ClientConfig {
        base_url: Some(base_url.to_string()),
        ..Default::default()
    };
    HttpClient::with_defaults(&config, store)
}

fn admin() -> LoginCredentials {
    LoginCredentials {
        email: mock_server::ADMIN_EMAIL.to_string(),
        password: mock_server::ADMIN_PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn dashboard_lifecycle() {
    let base = start_backend().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = default_client(&base, store.clone());
    let session = Session::new(store.clone());
    let auth = AuthApi::new(&client, session.clone());

    // Step 1: login persists the session.
    let login = auth.login(&admin()).await.unwrap();
    assert_eq!(login.user.email, mock_server::ADMIN_EMAIL);
    assert_eq!(session.token().as_deref(), Some(login.token.as_str()));
    assert!(session.refresh_token().is_some());
    assert!(session.is_authenticated());

    // Step 2: bearer header is injected for authenticated routes.
    let me = auth.current_user().await.unwrap();
    assert_eq!(me.id, 1);

    // Step 3: app CRUD.
    let apps = AppApi::new(&client);
    let created = apps
        .create(&CreateAppRequest {
            app_name: "Shop".to_string(),
            description: "storefront".to_string(),
            callback_url: "https://shop.example.com/cb".to_string(),
            ip_whitelist: String::new(),
            rate_limit: 50,
        })
        .await
        .unwrap();
    assert_eq!(created.app_name, "Shop");
    assert!(!created.app_secret.is_empty());

    let fetched = apps.get(&created.app_id).await.unwrap();
    assert_eq!(fetched.rate_limit, 50);
    assert!(fetched.app_secret.is_none());

    apps.update(
        &created.app_id,
        &UpdateAppRequest {
            status: Some(0),
            require_sign: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let page = apps.list(1, 10, Some(0)).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.list[0].require_sign, Some(true));

    let reset = apps.reset_secret(&created.app_id).await.unwrap();
    assert_ne!(reset.app_secret, created.app_secret);

    let example = apps.sign_example(&created.app_id).await.unwrap();
    assert!(example.iter().any(|(k, v)| k == "appId" && v == &created.app_id));

    apps.delete(&created.app_id).await.unwrap();
    let err = apps.get(&created.app_id).await.unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.code, Some(404));
    assert_eq!(err.message, "app not found");

    let empty = apps.list(1, 10, None).await.unwrap();
    assert!(empty.list.is_empty());

    // Step 4: orders.
    let orders = OrderApi::new(&client);
    let paid = orders
        .list(&OrderQuery {
            status: Some(201),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(paid.total, 2);

    let order = orders.get_by_no("N1002").await.unwrap();
    assert_eq!(order.id, 2);
    assert_eq!(orders.get(2).await.unwrap().order_no, "N1002");

    let stats = orders
        .stats(&StatsQuery {
            app_id: Some("app_demo".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stats.total_count, 2);
    assert_eq!(stats.paid_amount, 1500);

    // Step 5: logout clears the session; the next call is unauthenticated.
    auth.logout().await.unwrap();
    assert!(store.get(TOKEN_KEY).is_none());
    let err = auth.current_user().await.unwrap_err();
    assert_eq!(err.status, 401);
    assert_eq!(err.message, SESSION_EXPIRED_MESSAGE);
}

#[tokio::test]
async fn bad_credentials_surface_business_error() {
    let base = start_backend().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = default_client(&base, store.clone());
    let auth = AuthApi::new(&client, Session::new(store.clone()));

    let err = auth
        .login(&LoginCredentials {
            email: "nobody@example.com".to_string(),
            password: "x".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Business);
    assert_eq!(err.status, 200);
    assert_eq!(err.code, Some(400));
    assert!(store.get(TOKEN_KEY).is_none());
}

#[tokio::test]
async fn refresh_token_replaces_bearer() {
    let base = start_backend().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = default_client(&base, store.clone());
    let session = Session::new(store.clone());
    let auth = AuthApi::new(&client, session.clone());

    auth.login(&admin()).await.unwrap();
    let before = session.token().unwrap();
    let refreshed = auth.refresh_token().await.unwrap();
    assert_ne!(refreshed.token, before);
    assert_eq!(session.token().as_deref(), Some(refreshed.token.as_str()));
    auth.current_user().await.unwrap();
}

#[tokio::test]
async fn refresh_without_stored_token_fails_locally() {
    let store = Arc::new(MemorySessionStore::new());
    let client = default_client("http://127.0.0.1:9", store.clone());
    let auth = AuthApi::new(&client, Session::new(store));

    let err = auth.refresh_token().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Request);
}

#[tokio::test]
async fn unauthorized_clears_every_session_key() {
    let base = start_backend().await;
    let store = Arc::new(MemorySessionStore::new());
    store.set(TOKEN_KEY, "tok-stale");
    store.set(REFRESH_TOKEN_KEY, "ref-stale");
    store.set(USER_KEY, r#"{"id":1}"#);
    let client = default_client(&base, store.clone());

    let err = client
        .get::<Value>("/api/auth/me", Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.status, 401);
    assert_eq!(err.message, SESSION_EXPIRED_MESSAGE);
    assert!(store.get(TOKEN_KEY).is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).is_none());
    assert!(store.get(USER_KEY).is_none());
}

#[tokio::test]
async fn business_code_failure_on_http_200() {
    let base = start_backend().await;
    let client = HttpClient::new(&base);

    let err = client
        .get::<Value>("/api/v1/business-error", Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.message, "bad");
    assert_eq!(err.code, Some(500));
    assert_eq!(err.status, 200);
}

#[tokio::test]
async fn non_json_error_body_gets_fallback_envelope() {
    let base = start_backend().await;
    let client = HttpClient::new(&base);

    let err = client
        .get::<Value>("/api/v1/plain", Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.status, 502);
    assert_eq!(err.code, Some(502));
    assert_eq!(err.message, "request failed: 502");
}

#[tokio::test]
async fn missing_data_returns_envelope() {
    let base = start_backend().await;
    let client = HttpClient::new(&base);

    let whole: ApiResponse = client.get("/api/v1/no-data", Params::new()).await.unwrap();
    assert_eq!(whole.code, 200);
    assert_eq!(whole.message, "nothing to return");

    let typed: ApiResponse<Value> = client
        .request_envelope("/api/v1/no-data", RequestConfig::new())
        .await
        .unwrap();
    assert!(typed.data.is_none());
}

#[tokio::test]
async fn slow_backend_times_out_with_408() {
    let base = start_backend().await;
    let client = HttpClient::new(&base).with_timeout(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let err = client
        .get::<Value>("/api/v1/slow", Params::new().with("ms", 2_000))
        .await
        .unwrap_err();
    assert_eq!(err.status, 408);
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

#[tokio::test]
async fn per_request_timeout_overrides_default() {
    let base = start_backend().await;
    let client = HttpClient::new(&base).with_timeout(Duration::from_millis(50));

    let data: Value = client
        .get_with(
            "/api/v1/slow",
            Params::new().with("ms", 100),
            RequestConfig::new().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(data["sleptMs"], 100);
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(&format!("http://{addr}"));
    let err = client
        .get::<Value>("/api/v1/echo", Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.status, 0);
    assert_eq!(err.kind, ErrorKind::Network);
}

#[tokio::test]
async fn get_sends_merged_query_and_json_content_type() {
    let base = start_backend().await;
    let client = HttpClient::new(&base);

    let echo: Value = client
        .get_with(
            "/api/v1/echo",
            Params::new().with("page", 1).with("subject", "a b"),
            RequestConfig::new().with_param("page", 2),
        )
        .await
        .unwrap();
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["query"], serde_json::json!([["page", "2"], ["subject", "a b"]]));
    assert_eq!(echo["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn patch_and_delete_use_their_methods() {
    let base = start_backend().await;
    let client = HttpClient::new(&base);

    let echo: Value = client
        .patch("/api/v1/echo", &serde_json::json!({"status": 0}))
        .await
        .unwrap();
    assert_eq!(echo["method"], "PATCH");
    assert_eq!(echo["body"], r#"{"status":0}"#);

    let echo: Value = client.delete("/api/v1/echo").await.unwrap();
    assert_eq!(echo["method"], "DELETE");
    assert_eq!(echo["body"], "");
}

#[tokio::test]
async fn upload_sends_multipart_not_caller_content_type() {
    let base = start_backend().await;
    let client = HttpClient::new(&base);

    let form = FormData::new()
        .text("appId", "app_0001")
        .file("logo", "logo.txt", Some("text/plain"), b"logo-bytes".to_vec());
    let echo: Value = client
        .upload(
            "/api/v1/echo",
            form,
            RequestConfig::new().with_header("Content-Type", "application/json"),
        )
        .await
        .unwrap();

    let content_type = echo["headers"]["content-type"].as_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = echo["body"].as_str().unwrap();
    assert!(body.contains("app_0001"));
    assert!(body.contains("logo-bytes"));
}

async fn logged_in(base: &str) -> (HttpClient, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let client = default_client(base, store.clone());
    AuthApi::new(&client, Session::new(store.clone()))
        .login(&admin())
        .await
        .unwrap();
    (client, store)
}

#[tokio::test]
async fn export_downloads_csv_to_directory() {
    let base = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let (client, _store) = logged_in(&base).await;
    let client = client.with_download_dir(dir.path());

    let path = PaymentApi::new(&client)
        .export_orders(
            &PaymentFilter {
                pay_way: Some(pay_way::ALIPAY.to_string()),
                date_range: Some(("2024-05-01".to_string(), "2024-05-31".to_string())),
                ..Default::default()
            },
            ExportFormat::Csv,
        )
        .await
        .unwrap();

    assert!(path.starts_with(dir.path()));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("orders_") && name.ends_with(".csv"));
    let csv = std::fs::read_to_string(&path).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("N1001"));
}

#[tokio::test]
async fn payment_lifecycle() {
    let base = start_backend().await;
    let (client, _store) = logged_in(&base).await;
    let payments = PaymentApi::new(&client);

    let created = payments
        .create_payment(&CreatePaymentRequest {
            amount: 2500,
            subject: "Annual plan".to_string(),
            order_no: "N2001".to_string(),
            pay_way: pay_way::WECHAT.to_string(),
            notify_url: None,
            return_url: None,
            extra: None,
        })
        .await
        .unwrap();
    assert!(created.qr_code.is_some());

    let detail = payments.get_order(&created.order_id).await.unwrap();
    assert_eq!(detail.order.order_no, "N2001");
    assert_eq!(detail.pay_status, "NOTPAY");
    assert!(payments.qr_code("N2001").await.unwrap().qr_code.ends_with("N2001"));
    assert_eq!(payments.query_status("N2001").await.unwrap().status, "NOTPAY");

    let page = payments
        .list_orders(
            1,
            10,
            &PaymentFilter {
                status: Some(order_status::PENDING),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    payments.cancel_order("N2001", Some("changed mind")).await.unwrap();
    let err = payments.cancel_order("N2001", None).await.unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.message, "order cannot be cancelled");

    let refund = payments.refund("N1001", 500, Some("partial")).await.unwrap();
    assert_eq!(refund.status, "REFUNDED");
    let err = payments.refund("N1002", 100, None).await.unwrap_err();
    assert_eq!(err.message, "order is not paid");

    let stats = payments.stats(Some("app_demo")).await.unwrap();
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.success_orders, 0);
    assert_eq!(stats.today_orders, 3);

    let batch = payments
        .batch_update(&BatchUpdateRequest {
            order_ids: vec!["N1002".to_string(), "N1003".to_string(), "missing".to_string()],
            action: BatchAction::Cancel,
            reason: None,
            refund_amount: None,
        })
        .await
        .unwrap();
    assert_eq!(batch.success, 1);
    assert_eq!(batch.failed, 2);
    assert_eq!(batch.errors.len(), 2);
}

#[tokio::test]
async fn ids_are_encoded_as_single_path_segments() {
    let base = start_backend().await;
    let (client, _store) = logged_in(&base).await;

    // Unencoded, this would miss every route and get the router's plain 404.
    let err = OrderApi::new(&client).get_by_no("N1/00?1#x").await.unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.message, "order not found");
    let err = PaymentApi::new(&client).get_order("../orders/1").await.unwrap_err();
    assert_eq!(err.message, "order not found");
}

#[tokio::test]
async fn failed_download_goes_through_error_interceptors() {
    let base = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySessionStore::new());
    store.set(TOKEN_KEY, "tok-stale");
    let client = default_client(&base, store.clone()).with_download_dir(dir.path());

    let err = client
        .download("/api/v1/payment/export", Some("orders.csv"), RequestConfig::new())
        .await
        .unwrap_err();
    assert_eq!(err.status, 401);
    assert_eq!(err.message, SESSION_EXPIRED_MESSAGE);
    assert!(store.get(TOKEN_KEY).is_none());
    assert!(!dir.path().join("orders.csv").exists());
}
