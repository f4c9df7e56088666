//! In-memory stand-in for the payment dashboard backend.
//!
//! Every reply uses the `{code, message, data?}` envelope. Auth, app and
//! order routes behave like the real service; the `/api/v1/echo`, `slow`,
//! `business-error`, `no-data` and `plain` routes exist to exercise client
//! edge cases.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub status: i32,
    pub role: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub created_at: String,
    pub gender: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: i64,
    pub app_id: String,
    pub app_name: String,
    pub status: i32,
    pub description: String,
    pub callback_url: String,
    pub ip_whitelist: String,
    pub rate_limit: u32,
    pub require_sign: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    pub app_secret: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub app_id: String,
    pub user_id: String,
    pub order_no: String,
    pub trade_no: String,
    pub subject: String,
    pub amount: i64,
    pub status: i32,
    pub pay_way: String,
    pub order_type: String,
    pub extra: String,
    pub pay_time: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Refresh {
    pub refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApp {
    pub app_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub ip_whitelist: String,
    #[serde(default)]
    pub rate_limit: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApp {
    pub app_name: Option<String>,
    pub description: Option<String>,
    pub callback_url: Option<String>,
    pub ip_whitelist: Option<String>,
    pub rate_limit: Option<u32>,
    pub status: Option<i32>,
    pub require_sign: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub list: Option<Vec<T>>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Default)]
pub struct Store {
    /// access token → user id
    tokens: HashMap<String, i64>,
    /// refresh token → user id
    refresh_tokens: HashMap<String, i64>,
    apps: HashMap<String, App>,
    orders: Vec<Order>,
}

pub struct AppState {
    store: RwLock<Store>,
    next_id: AtomicI64,
}

pub type Db = Arc<AppState>;

const TIMESTAMP: &str = "2024-05-01T08:00:00Z";
/// The mock's clock never moves: "today" is the day of `TIMESTAMP`.
const TODAY: &str = "2024-05-01";

fn admin() -> User {
    User {
        id: 1,
        username: "admin".to_string(),
        email: ADMIN_EMAIL.to_string(),
        status: 1,
        role: "admin".to_string(),
        email_verified: true,
        phone_verified: false,
        created_at: TIMESTAMP.to_string(),
        gender: 0,
    }
}

fn seed_orders() -> Vec<Order> {
    let order = |id: i64, app: &str, no: &str, amount: i64, status: i32, pay_way: &str| Order {
        id,
        app_id: app.to_string(),
        user_id: format!("u{id}"),
        order_no: no.to_string(),
        trade_no: if status == 201 { format!("T{no}") } else { String::new() },
        subject: format!("Order {no}"),
        amount,
        status,
        pay_way: pay_way.to_string(),
        order_type: "qrcode".to_string(),
        extra: String::new(),
        pay_time: if status == 201 { 1_714_550_400 } else { 0 },
        created_at: TIMESTAMP.to_string(),
        updated_at: TIMESTAMP.to_string(),
    };
    vec![
        order(1, "app_demo", "N1001", 1500, 201, "alipay"),
        order(2, "app_demo", "N1002", 990, 1, "wechat"),
        order(3, "app_other", "N1003", 4200, 201, "wechat"),
    ]
}

fn envelope<T: Serialize>(status: StatusCode, code: i64, message: &str, data: Option<T>) -> Response {
    let body = ApiResponse {
        code,
        message: message.to_string(),
        data,
    };
    (status, Json(body)).into_response()
}

fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, 200, "success", Some(data))
}

fn fail(status: StatusCode, message: &str) -> Response {
    envelope::<()>(status, i64::from(status.as_u16()), message, None)
}

fn unauthorized() -> Response {
    fail(StatusCode::UNAUTHORIZED, "unauthorized")
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn authorized(db: &Db, headers: &HeaderMap) -> bool {
    match bearer(headers) {
        Some(token) => db.store.read().await.tokens.contains_key(token),
        None => false,
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(AppState {
        store: RwLock::new(Store {
            orders: seed_orders(),
            ..Default::default()
        }),
        next_id: AtomicI64::new(1),
    });
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/v1/apps", get(list_apps).post(create_app))
        .route(
            "/api/v1/apps/{app_id}",
            get(get_app).put(update_app).delete(delete_app),
        )
        .route("/api/v1/apps/{app_id}/reset-secret", post(reset_secret))
        .route("/api/v1/apps/{app_id}/sign-example", get(sign_example))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/stats", get(order_stats))
        .route("/api/v1/orders/no/{order_no}", get(get_order_by_no))
        .route("/api/v1/orders/{id}", get(get_order))
        .route("/api/v1/payment/create", post(create_payment))
        .route("/api/v1/payment/order/{order_id}", get(payment_order))
        .route("/api/v1/payment/orders", get(list_orders))
        .route("/api/v1/payment/stats", get(payment_stats))
        .route("/api/v1/payment/query/{order_id}", post(query_payment))
        .route("/api/v1/payment/refund/{order_id}", post(refund_payment))
        .route("/api/v1/payment/qrcode/{order_id}", get(payment_qr_code))
        .route("/api/v1/payment/cancel/{order_id}", post(cancel_payment))
        .route("/api/v1/payment/batch", post(batch_payments))
        .route("/api/v1/payment/export", get(export_orders))
        .route("/api/v1/echo", any(echo))
        .route("/api/v1/slow", get(slow))
        .route("/api/v1/business-error", get(business_error))
        .route("/api/v1/no-data", get(no_data))
        .route("/api/v1/plain", get(plain))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

async fn login(State(db): State<Db>, Json(input): Json<Login>) -> Response {
    if input.email != ADMIN_EMAIL || input.password != ADMIN_PASSWORD {
        tracing::debug!(email = %input.email, "login rejected");
        return envelope::<()>(StatusCode::OK, 400, "invalid email or password", None);
    }
    let token = format!("tok-{}", Uuid::new_v4());
    let refresh_token = format!("ref-{}", Uuid::new_v4());
    let mut store = db.store.write().await;
    store.tokens.insert(token.clone(), 1);
    store.refresh_tokens.insert(refresh_token.clone(), 1);
    ok(serde_json::json!({
        "user": admin(),
        "token": token,
        "refresh_token": refresh_token,
        "expires_at": "2099-01-01T00:00:00Z",
    }))
}

async fn register(Json(input): Json<serde_json::Value>) -> Response {
    if input.get("email").and_then(|e| e.as_str()).unwrap_or("").is_empty() {
        return fail(StatusCode::BAD_REQUEST, "email is required");
    }
    ok(serde_json::json!({ "message": "registered" }))
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    ok(admin())
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer(&headers) {
        db.store.write().await.tokens.remove(token);
    }
    ok(serde_json::json!({ "message": "logged out" }))
}

async fn refresh(State(db): State<Db>, Json(input): Json<Refresh>) -> Response {
    let mut store = db.store.write().await;
    let Some(user_id) = store.refresh_tokens.get(&input.refresh_token).copied() else {
        return unauthorized();
    };
    let token = format!("tok-{}", Uuid::new_v4());
    store.tokens.insert(token.clone(), user_id);
    ok(serde_json::json!({ "token": token, "expires_at": "2099-01-01T00:00:00Z" }))
}

// ---------------------------------------------------------------------------
// Apps
// ---------------------------------------------------------------------------

fn page_bounds(query: &HashMap<String, String>) -> (usize, usize) {
    let page = query
        .get("page")
        .and_then(|p| p.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    let size = query
        .get("pageSize")
        .and_then(|p| p.parse::<usize>().ok())
        .unwrap_or(10)
        .max(1);
    (page, size)
}

fn paginate<T: Clone>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let total = items.len();
    let slice: Vec<T> = items
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    Page {
        list: if slice.is_empty() { None } else { Some(slice) },
        total,
        page,
        page_size,
    }
}

async fn list_apps(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let status: Option<i32> = query.get("status").and_then(|s| s.parse().ok());
    let store = db.store.read().await;
    let mut apps: Vec<App> = store
        .apps
        .values()
        .filter(|a| status.is_none_or(|s| a.status == s))
        .cloned()
        .collect();
    apps.sort_by_key(|a| a.id);
    let (page, size) = page_bounds(&query);
    ok(paginate(apps, page, size))
}

async fn create_app(State(db): State<Db>, headers: HeaderMap, Json(input): Json<CreateApp>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    if input.app_name.trim().is_empty() {
        return envelope(
            StatusCode::BAD_REQUEST,
            400,
            "appName is required",
            Some(serde_json::json!({ "field": "appName" })),
        );
    }
    let id = db.next_id.fetch_add(1, Ordering::Relaxed);
    let app = App {
        id,
        app_id: format!("app_{id:04}"),
        app_name: input.app_name,
        status: 1,
        description: input.description,
        callback_url: input.callback_url,
        ip_whitelist: input.ip_whitelist,
        rate_limit: input.rate_limit,
        require_sign: false,
        created_at: TIMESTAMP.to_string(),
        updated_at: TIMESTAMP.to_string(),
        app_secret: Uuid::new_v4().simple().to_string(),
    };
    let reply = serde_json::json!({
        "appId": app.app_id,
        "appSecret": app.app_secret,
        "appName": app.app_name,
    });
    db.store.write().await.apps.insert(app.app_id.clone(), app);
    ok(reply)
}

async fn get_app(State(db): State<Db>, headers: HeaderMap, Path(app_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    match db.store.read().await.apps.get(&app_id) {
        Some(app) => ok(app.clone()),
        None => fail(StatusCode::NOT_FOUND, "app not found"),
    }
}

async fn update_app(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(app_id): Path<String>,
    Json(input): Json<UpdateApp>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    let Some(app) = store.apps.get_mut(&app_id) else {
        return fail(StatusCode::NOT_FOUND, "app not found");
    };
    if let Some(v) = input.app_name {
        app.app_name = v;
    }
    if let Some(v) = input.description {
        app.description = v;
    }
    if let Some(v) = input.callback_url {
        app.callback_url = v;
    }
    if let Some(v) = input.ip_whitelist {
        app.ip_whitelist = v;
    }
    if let Some(v) = input.rate_limit {
        app.rate_limit = v;
    }
    if let Some(v) = input.status {
        app.status = v;
    }
    if let Some(v) = input.require_sign {
        app.require_sign = v;
    }
    ok("updated")
}

async fn delete_app(State(db): State<Db>, headers: HeaderMap, Path(app_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    match db.store.write().await.apps.remove(&app_id) {
        Some(_) => ok("deleted"),
        None => fail(StatusCode::NOT_FOUND, "app not found"),
    }
}

async fn reset_secret(State(db): State<Db>, headers: HeaderMap, Path(app_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    let Some(app) = store.apps.get_mut(&app_id) else {
        return fail(StatusCode::NOT_FOUND, "app not found");
    };
    app.app_secret = Uuid::new_v4().simple().to_string();
    ok(serde_json::json!({ "appSecret": app.app_secret, "message": "secret reset" }))
}

async fn sign_example(State(db): State<Db>, headers: HeaderMap, Path(app_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    if !db.store.read().await.apps.contains_key(&app_id) {
        return fail(StatusCode::NOT_FOUND, "app not found");
    }
    ok(serde_json::json!({
        "appId": app_id,
        "timestamp": "1714550400",
        "nonce": "abc123",
        "sign": "<md5 of sorted params + secret>",
    }))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

fn order_day(order: &Order) -> &str {
    order.created_at.get(..10).unwrap_or(&order.created_at)
}

fn filter_orders(orders: &[Order], query: &HashMap<String, String>) -> Vec<Order> {
    let status: Option<i32> = query.get("status").and_then(|s| s.parse().ok());
    orders
        .iter()
        .filter(|o| query.get("appId").is_none_or(|v| &o.app_id == v))
        .filter(|o| query.get("payWay").is_none_or(|v| &o.pay_way == v))
        .filter(|o| query.get("orderNo").is_none_or(|v| &o.order_no == v))
        .filter(|o| status.is_none_or(|s| o.status == s))
        .filter(|o| query.get("startDate").is_none_or(|d| order_day(o) >= d.as_str()))
        .filter(|o| query.get("endDate").is_none_or(|d| order_day(o) <= d.as_str()))
        .cloned()
        .collect()
}

async fn list_orders(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let orders = filter_orders(&db.store.read().await.orders, &query);
    let (page, size) = page_bounds(&query);
    ok(paginate(orders, page, size))
}

async fn get_order(State(db): State<Db>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    match db.store.read().await.orders.iter().find(|o| o.id == id) {
        Some(order) => ok(order.clone()),
        None => fail(StatusCode::NOT_FOUND, "order not found"),
    }
}

async fn get_order_by_no(State(db): State<Db>, headers: HeaderMap, Path(order_no): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    match db.store.read().await.orders.iter().find(|o| o.order_no == order_no) {
        Some(order) => ok(order.clone()),
        None => fail(StatusCode::NOT_FOUND, "order not found"),
    }
}

async fn order_stats(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let orders = filter_orders(&db.store.read().await.orders, &query);
    let paid: Vec<&Order> = orders.iter().filter(|o| o.status == 201).collect();
    ok(serde_json::json!({
        "totalCount": orders.len(),
        "paidCount": paid.len(),
        "unpaidCount": orders.len() - paid.len(),
        "totalAmount": orders.iter().map(|o| o.amount).sum::<i64>(),
        "paidAmount": paid.iter().map(|o| o.amount).sum::<i64>(),
    }))
}

async fn export_orders(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let orders = filter_orders(&db.store.read().await.orders, &query);
    let mut csv = String::from("orderNo,appId,amount,status,payWay\n");
    for o in &orders {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            o.order_no, o.app_id, o.amount, o.status, o.pay_way
        ));
    }
    ([(header::CONTENT_TYPE, "text/csv")], csv).into_response()
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

const PAY_WAYS: [&str; 3] = ["alipay", "wechat", "paypal"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayment {
    pub amount: i64,
    pub subject: String,
    pub order_no: String,
    pub pay_way: String,
    #[serde(default)]
    pub extra: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundInput {
    pub refund_amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CancelInput {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    pub order_ids: Vec<String>,
    pub action: String,
    #[serde(default)]
    pub refund_amount: Option<i64>,
}

/// Orders are addressed by numeric id or by order number.
fn find_order<'a>(orders: &'a mut [Order], order_id: &str) -> Option<&'a mut Order> {
    orders
        .iter_mut()
        .find(|o| o.id.to_string() == order_id || o.order_no == order_id)
}

fn pay_status(status: i32) -> &'static str {
    match status {
        1 => "NOTPAY",
        2 => "USERPAYING",
        201 => "SUCCESS",
        500 => "PAYERROR",
        600 => "CLOSED",
        700 => "REFUND",
        _ => "UNKNOWN",
    }
}

fn awaiting_payment(order: &Order) -> bool {
    order.status == 1 || order.status == 2
}

fn cancel(order: &mut Order) -> Result<(), &'static str> {
    if !awaiting_payment(order) {
        return Err("order cannot be cancelled");
    }
    order.status = 600;
    Ok(())
}

fn refund(order: &mut Order, amount: i64) -> Result<String, &'static str> {
    if order.status != 201 {
        return Err("order is not paid");
    }
    if amount <= 0 || amount > order.amount {
        return Err("invalid refund amount");
    }
    order.status = 700;
    Ok(format!("R{}", order.order_no))
}

async fn create_payment(State(db): State<Db>, headers: HeaderMap, Json(input): Json<CreatePayment>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    if input.amount <= 0 {
        return fail(StatusCode::BAD_REQUEST, "amount must be positive");
    }
    if !PAY_WAYS.contains(&input.pay_way.as_str()) {
        return fail(StatusCode::BAD_REQUEST, "unsupported pay way");
    }
    let mut store = db.store.write().await;
    if input.order_no.is_empty() || store.orders.iter().any(|o| o.order_no == input.order_no) {
        return fail(StatusCode::BAD_REQUEST, "duplicate or empty order number");
    }
    let id = store.orders.iter().map(|o| o.id).max().unwrap_or(0) + 1;
    let qr_code = format!("https://qr.example.com/{}", input.order_no);
    store.orders.push(Order {
        id,
        app_id: "app_demo".to_string(),
        user_id: String::new(),
        order_no: input.order_no,
        trade_no: String::new(),
        subject: input.subject,
        amount: input.amount,
        status: 1,
        pay_way: input.pay_way,
        order_type: "qrcode".to_string(),
        extra: input.extra.unwrap_or_default(),
        pay_time: 0,
        created_at: TIMESTAMP.to_string(),
        updated_at: TIMESTAMP.to_string(),
    });
    ok(serde_json::json!({ "orderId": id.to_string(), "qrCode": qr_code }))
}

async fn payment_order(State(db): State<Db>, headers: HeaderMap, Path(order_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    match find_order(&mut store.orders, &order_id) {
        Some(order) => ok(serde_json::json!({
            "order": order.clone(),
            "payStatus": pay_status(order.status),
        })),
        None => fail(StatusCode::NOT_FOUND, "order not found"),
    }
}

async fn payment_stats(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let orders = filter_orders(&db.store.read().await.orders, &query);
    let success: Vec<&Order> = orders.iter().filter(|o| o.status == 201).collect();
    let today: Vec<&Order> = orders.iter().filter(|o| order_day(o) == TODAY).collect();
    ok(serde_json::json!({
        "totalOrders": orders.len(),
        "successOrders": success.len(),
        "totalAmount": orders.iter().map(|o| o.amount).sum::<i64>(),
        "successAmount": success.iter().map(|o| o.amount).sum::<i64>(),
        "todayOrders": today.len(),
        "todayAmount": today.iter().map(|o| o.amount).sum::<i64>(),
    }))
}

async fn query_payment(State(db): State<Db>, headers: HeaderMap, Path(order_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    match find_order(&mut store.orders, &order_id) {
        Some(order) => ok(serde_json::json!({
            "status": pay_status(order.status),
            "message": "status synced",
        })),
        None => fail(StatusCode::NOT_FOUND, "order not found"),
    }
}

async fn refund_payment(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Json(input): Json<RefundInput>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    let Some(order) = find_order(&mut store.orders, &order_id) else {
        return fail(StatusCode::NOT_FOUND, "order not found");
    };
    match refund(order, input.refund_amount) {
        Ok(refund_id) => {
            tracing::debug!(order_no = %order.order_no, reason = ?input.reason, "order refunded");
            ok(serde_json::json!({ "refundId": refund_id, "status": "REFUNDED" }))
        }
        Err(message) => fail(StatusCode::BAD_REQUEST, message),
    }
}

async fn payment_qr_code(State(db): State<Db>, headers: HeaderMap, Path(order_id): Path<String>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    match find_order(&mut store.orders, &order_id) {
        Some(order) if awaiting_payment(order) => ok(serde_json::json!({
            "qrCode": format!("https://qr.example.com/{}", order.order_no),
            "expireTime": "2024-05-01T08:15:00Z",
        })),
        Some(_) => fail(StatusCode::BAD_REQUEST, "order is not awaiting payment"),
        None => fail(StatusCode::NOT_FOUND, "order not found"),
    }
}

async fn cancel_payment(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Json(input): Json<CancelInput>,
) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    let mut store = db.store.write().await;
    let Some(order) = find_order(&mut store.orders, &order_id) else {
        return fail(StatusCode::NOT_FOUND, "order not found");
    };
    match cancel(order) {
        Ok(()) => {
            tracing::debug!(order_no = %order.order_no, reason = ?input.reason, "order cancelled");
            ok(serde_json::json!({ "message": "order cancelled" }))
        }
        Err(message) => fail(StatusCode::BAD_REQUEST, message),
    }
}

async fn batch_payments(State(db): State<Db>, headers: HeaderMap, Json(input): Json<BatchInput>) -> Response {
    if !authorized(&db, &headers).await {
        return unauthorized();
    }
    if input.action != "cancel" && input.action != "refund" {
        return fail(StatusCode::BAD_REQUEST, "unknown batch action");
    }
    let mut store = db.store.write().await;
    let mut success = 0;
    let mut errors = Vec::new();
    for order_id in &input.order_ids {
        let result = match find_order(&mut store.orders, order_id) {
            None => Err("order not found"),
            Some(order) if input.action == "cancel" => cancel(order),
            Some(order) => {
                let amount = input.refund_amount.unwrap_or(order.amount);
                refund(order, amount).map(|_| ())
            }
        };
        match result {
            Ok(()) => success += 1,
            Err(message) => errors.push(format!("{order_id}: {message}")),
        }
    }
    ok(serde_json::json!({ "success": success, "failed": errors.len(), "errors": errors }))
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Reflects the request back inside the envelope.
async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    ok(serde_json::json!({
        "method": method.as_str(),
        "query": query,
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

#[derive(Deserialize)]
struct SlowQuery {
    #[serde(default)]
    ms: u64,
}

async fn slow(Query(query): Query<SlowQuery>) -> Response {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    ok(serde_json::json!({ "sleptMs": query.ms }))
}

async fn business_error() -> Response {
    envelope::<()>(StatusCode::OK, 500, "bad", None)
}

async fn no_data() -> Response {
    envelope::<()>(StatusCode::OK, 200, "nothing to return", None)
}

async fn plain() -> Response {
    (StatusCode::BAD_GATEWAY, "bad gateway").into_response()
}
