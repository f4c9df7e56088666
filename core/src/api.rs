//! Typed wrappers over the dashboard's backend endpoints.
//!
//! Each wrapper borrows an `HttpClient` and adds nothing but paths, params
//! and types; authentication and error handling come from the client's
//! interceptors.

use std::path::PathBuf;

use crate::client::HttpClient;
use crate::error::HttpError;
use crate::request::{Params, RequestConfig};
use crate::session::Session;
use crate::types::{
    ApiApp, BatchUpdateRequest, BatchResult, CreateAppRequest, CreateAppResponse, CreatePaymentRequest,
    LoginCredentials, LoginResponse, MessageResponse, OrderQuery, OrderQueryResponse, OrderStats,
    Paginated, PaymentFilter, PaymentOrder, PaymentQrCode, PaymentResponse, PaymentStats, PaymentStatus,
    RefundResponse, RegisterData, ResetSecretResponse, StatsQuery, TokenResponse, UpdateAppRequest, User,
};

/// Percent-encode one path segment so ids cannot change the route.
fn seg(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}

/// `/api/v1/apps`
#[derive(Debug, Clone, Copy)]
pub struct AppApi<'a> {
    client: &'a HttpClient,
}

impl<'a> AppApi<'a> {
    pub fn new(client: &'a HttpClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: u32, page_size: u32, status: Option<i32>) -> Result<Paginated<ApiApp>, HttpError> {
        let mut params = Params::new().with("page", page).with("pageSize", page_size);
        params.set_opt("status", status);
        self.client.get("/api/v1/apps", params).await
    }

    pub async fn create(&self, input: &CreateAppRequest) -> Result<CreateAppResponse, HttpError> {
        self.client.post("/api/v1/apps", input).await
    }

    pub async fn get(&self, app_id: &str) -> Result<ApiApp, HttpError> {
        self.client.get(&format!("/api/v1/apps/{}", seg(app_id)), Params::new()).await
    }

    pub async fn update(&self, app_id: &str, input: &UpdateAppRequest) -> Result<(), HttpError> {
        let _: serde_json::Value = self.client.put(&format!("/api/v1/apps/{}", seg(app_id)), input).await?;
        Ok(())
    }

    pub async fn delete(&self, app_id: &str) -> Result<(), HttpError> {
        let _: serde_json::Value = self.client.delete(&format!("/api/v1/apps/{}", seg(app_id))).await?;
        Ok(())
    }

    pub async fn reset_secret(&self, app_id: &str) -> Result<ResetSecretResponse, HttpError> {
        self.client
            .post(&format!("/api/v1/apps/{}/reset-secret", seg(app_id)), &())
            .await
    }

    /// Example signed parameter set for the app, as key/value strings.
    pub async fn sign_example(&self, app_id: &str) -> Result<Vec<(String, String)>, HttpError> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .client
            .get(&format!("/api/v1/apps/{}/sign-example", seg(app_id)), Params::new())
            .await?;
        Ok(map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect())
    }
}

/// Export file format for `PaymentApi::export_orders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// `/api/v1/orders`
#[derive(Debug, Clone, Copy)]
pub struct OrderApi<'a> {
    client: &'a HttpClient,
}

impl OrderQuery {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.set_opt("page", self.page);
        params.set_opt("pageSize", self.page_size);
        params.set_opt("appId", self.app_id.as_ref());
        params.set_opt("status", self.status);
        params.set_opt("payWay", self.pay_way.as_ref());
        params.set_opt("orderNo", self.order_no.as_ref());
        params.set_opt("subject", self.subject.as_ref());
        params.set_opt("startTime", self.start_time.as_ref());
        params.set_opt("endTime", self.end_time.as_ref());
        params
    }
}

impl StatsQuery {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.set_opt("appId", self.app_id.as_ref());
        params.set_opt("startTime", self.start_time.as_ref());
        params.set_opt("endTime", self.end_time.as_ref());
        params
    }
}

impl<'a> OrderApi<'a> {
    pub fn new(client: &'a HttpClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &OrderQuery) -> Result<Paginated<PaymentOrder>, HttpError> {
        self.client.get("/api/v1/orders", query.to_params()).await
    }

    pub async fn get(&self, id: i64) -> Result<PaymentOrder, HttpError> {
        self.client.get(&format!("/api/v1/orders/{id}"), Params::new()).await
    }

    pub async fn get_by_no(&self, order_no: &str) -> Result<PaymentOrder, HttpError> {
        self.client
            .get(&format!("/api/v1/orders/no/{}", seg(order_no)), Params::new())
            .await
    }

    pub async fn stats(&self, query: &StatsQuery) -> Result<OrderStats, HttpError> {
        self.client.get("/api/v1/orders/stats", query.to_params()).await
    }
}

impl PaymentFilter {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.set_opt("status", self.status);
        params.set_opt("payWay", self.pay_way.as_ref());
        params.set_opt("appId", self.app_id.as_ref());
        if let Some((start, end)) = &self.date_range {
            params.set("startDate", start);
            params.set("endDate", end);
        }
        params
    }
}

/// `/api/v1/payment`: order creation, refunds, cancellation and export.
#[derive(Debug, Clone, Copy)]
pub struct PaymentApi<'a> {
    client: &'a HttpClient,
}

impl<'a> PaymentApi<'a> {
    pub fn new(client: &'a HttpClient) -> Self {
        Self { client }
    }

    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentResponse, HttpError> {
        self.client.post("/api/v1/payment/create", request).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<OrderQueryResponse, HttpError> {
        self.client
            .get(&format!("/api/v1/payment/order/{}", seg(order_id)), Params::new())
            .await
    }

    pub async fn list_orders(
        &self,
        page: u32,
        page_size: u32,
        filter: &PaymentFilter,
    ) -> Result<Paginated<PaymentOrder>, HttpError> {
        let mut params = Params::new().with("page", page).with("pageSize", page_size);
        params.merge(&filter.to_params());
        self.client.get("/api/v1/payment/orders", params).await
    }

    pub async fn stats(&self, app_id: Option<&str>) -> Result<PaymentStats, HttpError> {
        let mut params = Params::new();
        params.set_opt("appId", app_id);
        self.client.get("/api/v1/payment/stats", params).await
    }

    /// Ask the backend to re-check the order with the payment channel.
    pub async fn query_status(&self, order_id: &str) -> Result<PaymentStatus, HttpError> {
        self.client
            .post(&format!("/api/v1/payment/query/{}", seg(order_id)), &())
            .await
    }

    pub async fn refund(
        &self,
        order_id: &str,
        refund_amount: i64,
        reason: Option<&str>,
    ) -> Result<RefundResponse, HttpError> {
        self.client
            .post(
                &format!("/api/v1/payment/refund/{}", seg(order_id)),
                &serde_json::json!({ "refundAmount": refund_amount, "reason": reason }),
            )
            .await
    }

    pub async fn qr_code(&self, order_id: &str) -> Result<PaymentQrCode, HttpError> {
        self.client
            .get(&format!("/api/v1/payment/qrcode/{}", seg(order_id)), Params::new())
            .await
    }

    pub async fn cancel_order(&self, order_id: &str, reason: Option<&str>) -> Result<MessageResponse, HttpError> {
        self.client
            .post(
                &format!("/api/v1/payment/cancel/{}", seg(order_id)),
                &serde_json::json!({ "reason": reason }),
            )
            .await
    }

    pub async fn batch_update(&self, request: &BatchUpdateRequest) -> Result<BatchResult, HttpError> {
        self.client.post("/api/v1/payment/batch", request).await
    }

    /// Save the filtered order export as `orders_<UTC date>.<ext>`.
    pub async fn export_orders(&self, filter: &PaymentFilter, format: ExportFormat) -> Result<PathBuf, HttpError> {
        let mut params = Params::new().with("format", format.extension());
        params.merge(&filter.to_params());
        let filename = format!(
            "orders_{}.{}",
            chrono::Utc::now().format("%Y-%m-%d"),
            format.extension()
        );
        self.client
            .download(
                "/api/v1/payment/export",
                Some(&filename),
                RequestConfig::new().with_params(params),
            )
            .await
    }
}

/// `/api/auth`. Keeps the session store in step with login and logout.
#[derive(Clone)]
pub struct AuthApi<'a> {
    client: &'a HttpClient,
    session: Session,
}

impl<'a> AuthApi<'a> {
    pub fn new(client: &'a HttpClient, session: Session) -> Self {
        Self { client, session }
    }

    /// Log in and persist token, refresh token and user.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, HttpError> {
        let response: LoginResponse = self.client.post("/api/auth/login", credentials).await?;
        self.session.set_token(&response.token);
        if !response.refresh_token.is_empty() {
            self.session.set_refresh_token(&response.refresh_token);
        }
        self.session.set_user(&response.user);
        tracing::info!(user_id = response.user.id, "logged in");
        Ok(response)
    }

    pub async fn register(&self, data: &RegisterData) -> Result<MessageResponse, HttpError> {
        self.client.post("/api/auth/register", data).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse, HttpError> {
        self.client
            .post("/api/auth/forgot-password", &serde_json::json!({ "email": email }))
            .await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<MessageResponse, HttpError> {
        self.client
            .post(
                "/api/auth/reset-password",
                &serde_json::json!({ "token": token, "password": password }),
            )
            .await
    }

    /// Fetch the current user and refresh the cached copy.
    pub async fn current_user(&self) -> Result<User, HttpError> {
        let user: User = self.client.get("/api/auth/me", Params::new()).await?;
        self.session.set_user(&user);
        Ok(user)
    }

    pub async fn update_profile(&self, changes: &serde_json::Value) -> Result<User, HttpError> {
        let user: User = self.client.put("/api/auth/profile", changes).await?;
        self.session.set_user(&user);
        Ok(user)
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<MessageResponse, HttpError> {
        self.client
            .post(
                "/api/auth/change-password",
                &serde_json::json!({ "old_password": old_password, "new_password": new_password }),
            )
            .await
    }

    /// Exchange the stored refresh token for a new bearer token.
    pub async fn refresh_token(&self) -> Result<TokenResponse, HttpError> {
        let refresh = self
            .session
            .refresh_token()
            .ok_or_else(|| HttpError::request("no refresh token stored"))?;
        let response: TokenResponse = self
            .client
            .post("/api/auth/refresh", &serde_json::json!({ "refresh_token": refresh }))
            .await?;
        self.session.set_token(&response.token);
        if let Some(refresh) = &response.refresh_token {
            self.session.set_refresh_token(refresh);
        }
        Ok(response)
    }

    /// Tell the backend, then clear the session whatever it answered.
    pub async fn logout(&self) -> Result<(), HttpError> {
        let result: Result<serde_json::Value, HttpError> = self.client.post("/api/auth/logout", &()).await;
        self.session.clear();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "logout request failed; session cleared locally");
        }
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_query_sends_only_set_filters() {
        let query = OrderQuery {
            page: Some(2),
            status: Some(crate::types::order_status::PAID),
            pay_way: Some("alipay".to_string()),
            ..Default::default()
        };
        let params: Vec<(String, String)> = query
            .to_params()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            params,
            vec![
                ("page".to_string(), "2".to_string()),
                ("status".to_string(), "201".to_string()),
                ("payWay".to_string(), "alipay".to_string()),
            ]
        );
    }

    #[test]
    fn empty_stats_query_has_no_params() {
        assert!(StatsQuery::default().to_params().is_empty());
    }

    #[test]
    fn payment_filter_splits_date_range() {
        let filter = PaymentFilter {
            status: Some(crate::types::order_status::PAID),
            date_range: Some(("2024-05-01".to_string(), "2024-05-31".to_string())),
            ..Default::default()
        };
        let params: Vec<(String, String)> = filter
            .to_params()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            params,
            vec![
                ("status".to_string(), "201".to_string()),
                ("startDate".to_string(), "2024-05-01".to_string()),
                ("endDate".to_string(), "2024-05-31".to_string()),
            ]
        );
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(seg("N1001"), "N1001");
        assert_eq!(seg("a/b?c#d e"), "a%2Fb%3Fc%23d%20e");
    }

    #[test]
    fn export_extensions() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Xlsx.extension(), "xlsx");
    }
}
