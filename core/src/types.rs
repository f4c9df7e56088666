//! Domain DTOs for the payment dashboard backend.
//!
//! # Design
//! These mirror the backend's JSON but are defined independently of the
//! mock-server crate; integration tests catch any schema drift. Apps and
//! orders use camelCase on the wire, auth payloads use snake_case.

use serde::{Deserialize, Serialize};

/// A registered API application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiApp {
    pub id: i64,
    pub app_id: String,
    /// Only returned by a few endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    pub app_name: String,
    pub status: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub ip_whitelist: String,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_sign: Option<bool>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppRequest {
    pub app_name: String,
    pub description: String,
    pub callback_url: String,
    pub ip_whitelist: String,
    pub rate_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppResponse {
    pub app_id: String,
    pub app_secret: String,
    pub app_name: String,
}

/// Partial update; omitted fields stay unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_whitelist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_sign: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSecretResponse {
    pub app_secret: String,
    #[serde(default)]
    pub message: String,
}

/// Order status codes used by the backend.
pub mod order_status {
    pub const PENDING: i32 = 1;
    pub const SCANNED: i32 = 2;
    pub const PAID: i32 = 201;
    pub const FAILED: i32 = 500;
    pub const CANCELLED: i32 = 600;
    pub const REFUNDED: i32 = 700;
}

pub mod pay_way {
    pub const ALIPAY: &str = "alipay";
    pub const WECHAT: &str = "wechat";
    pub const PAYPAL: &str = "paypal";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub id: i64,
    pub app_id: String,
    #[serde(default)]
    pub user_id: String,
    pub order_no: String,
    #[serde(default)]
    pub trade_no: String,
    pub subject: String,
    /// Minor currency units.
    pub amount: i64,
    pub status: i32,
    pub pay_way: String,
    #[serde(default)]
    pub order_type: String,
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub pay_time: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Filters for the order list. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub app_id: Option<String>,
    pub status: Option<i32>,
    pub pay_way: Option<String>,
    pub order_no: Option<String>,
    pub subject: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsQuery {
    pub app_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_count: u64,
    pub paid_count: u64,
    pub unpaid_count: u64,
    pub total_amount: i64,
    pub paid_amount: i64,
}

/// One page of results. The backend sends `list: null` for empty pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
)]
pub struct Paginated<T> {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub list: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Filters shared by the payment order list and the export.
/// Unset fields are not sent; `date_range` becomes `startDate`/`endDate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFilter {
    pub status: Option<i32>,
    pub pay_way: Option<String>,
    pub app_id: Option<String>,
    pub date_range: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Minor currency units.
    pub amount: i64,
    pub subject: String,
    pub order_no: String,
    pub pay_way: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQueryResponse {
    pub order: PaymentOrder,
    pub pay_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_orders: u64,
    pub success_orders: u64,
    pub total_amount: i64,
    pub success_amount: i64,
    pub today_orders: u64,
    pub today_amount: i64,
}

/// Reply of a manual status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub refund_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQrCode {
    pub qr_code: String,
    pub expire_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Cancel,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateRequest {
    pub order_ids: Vec<String>,
    pub action: BatchAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: u64,
    pub failed: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: i32,
    pub role: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub gender: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    /// Username, or the local part of the email when the username is blank.
    pub fn display_name(&self) -> &str {
        if !self.username.is_empty() {
            return &self.username;
        }
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterData {
    pub username: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: String,
}

/// Reply of endpoints that only carry a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}
