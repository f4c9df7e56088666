//! The single chokepoint for backend calls.
//!
//! # Design
//! `HttpClient` owns the resolved base URL, the default timeout, a
//! `Transport`, and three interceptor lists. Every call runs the same
//! pipeline:
//!
//! ```text
//! RequestConfig ─▶ request interceptors ─▶ URL + headers ─▶ transport (timeout)
//!      ─▶ response interceptors ─▶ envelope decode ─▶ code/status check ─▶ unwrap
//!                                   any failure ─▶ error interceptors ─▶ caller
//! ```
//!
//! Interceptors are registered through `&mut self`, so registration is
//! finished before the client is shared (typically behind an `Arc`), and the
//! lists are read-only while requests are in flight. Within one call each
//! list runs sequentially in registration order. No retries happen here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{AuthExpiry, BearerAuth};
use crate::config::{ClientConfig, DEFAULT_TIMEOUT_MS};
use crate::envelope::{ApiResponse, Envelope};
use crate::error::{ErrorKind, HttpError};
use crate::http::{FormData, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
use crate::request::{Params, RequestConfig};
use crate::session::SessionStore;
use crate::transport::{ReqwestTransport, Transport};

const CONTENT_TYPE: &str = "Content-Type";
const JSON: &str = "application/json";

/// Filename used by `download` when none is given.
pub const DEFAULT_DOWNLOAD_NAME: &str = "download";

/// Envelope-aware HTTP client with request/response/error interceptors.
pub struct HttpClient {
    base_url: String,
    default_timeout: Duration,
    download_dir: PathBuf,
    transport: Arc<dyn Transport>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("default_timeout", &self.default_timeout)
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptors", &self.response_interceptors.len())
            .field("error_interceptors", &self.error_interceptors.len())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Client bound to an explicit origin, bypassing the resolution policy.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            download_dir: PathBuf::from("."),
            transport: Arc::new(ReqwestTransport::new()),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            error_interceptors: Vec::new(),
        }
    }

    /// Client whose base URL follows the configured resolution policy.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self::new(&config.resolve_base_url());
        client.default_timeout = config.timeout();
        client.download_dir = config.download_dir.clone();
        client
    }

    /// The application's standard client: bearer injection from `store`
    /// and session clearing on 401.
    pub fn with_defaults(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Self {
        let mut client = Self::from_config(config);
        client.add_request_interceptor(BearerAuth::new(store.clone()));
        client.add_error_interceptor(AuthExpiry::new(store));
        client
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn add_request_interceptor<I: RequestInterceptor + 'static>(&mut self, interceptor: I) {
        self.request_interceptors.push(Arc::new(interceptor));
    }

    pub fn add_response_interceptor<I: ResponseInterceptor + 'static>(&mut self, interceptor: I) {
        self.response_interceptors.push(Arc::new(interceptor));
    }

    pub fn add_error_interceptor<I: ErrorInterceptor + 'static>(&mut self, interceptor: I) {
        self.error_interceptors.push(Arc::new(interceptor));
    }

    /// Join `path` onto the base URL and append `params` as a query string.
    pub fn build_url(&self, path: &str, params: &Params) -> String {
        build_url(&self.base_url, path, params)
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    async fn process_request_config(&self, mut config: RequestConfig) -> Result<RequestConfig, HttpError> {
        for interceptor in &self.request_interceptors {
            config = interceptor.on_request(config).await?;
        }
        Ok(config)
    }

    async fn process_response(&self, mut response: HttpResponse) -> Result<HttpResponse, HttpError> {
        for interceptor in &self.response_interceptors {
            response = interceptor.on_response(response).await?;
        }
        Ok(response)
    }

    async fn process_error(&self, mut error: HttpError) -> HttpError {
        for interceptor in &self.error_interceptors {
            error = interceptor.on_error(error).await;
        }
        error
    }

    /// Run failures through the error interceptors before handing them back.
    async fn finish<T>(&self, result: Result<T, HttpError>) -> Result<T, HttpError> {
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                let error = self.process_error(error).await;
                tracing::warn!(
                    status = error.status,
                    code = ?error.code,
                    kind = ?error.kind,
                    message = %error.message,
                    "request failed"
                );
                Err(error)
            }
        }
    }

    /// Turn a processed config into a transport request.
    ///
    /// The JSON `Content-Type` default sits underneath the config's own
    /// headers. Multipart bodies never carry an explicit `Content-Type`; the
    /// transport supplies it with the boundary.
    fn assemble(&self, path: &str, config: RequestConfig, json_default: bool) -> (HttpRequest, Duration) {
        let RequestConfig {
            method,
            headers: config_headers,
            body,
            timeout,
            base_url,
            params,
        } = config;

        let base = base_url.as_deref().unwrap_or(&self.base_url);
        let url = build_url(base, path, &params);

        let multipart = matches!(body, Some(RequestBody::Multipart(_)));
        let mut merged = RequestConfig::new();
        if json_default && !multipart {
            merged.set_header(CONTENT_TYPE, JSON);
        }
        for (name, value) in config_headers {
            merged.set_header(name, value);
        }
        if multipart {
            merged.remove_header(CONTENT_TYPE);
        }

        let request = HttpRequest {
            method,
            url,
            headers: merged.headers,
            body,
        };
        (request, timeout.unwrap_or(self.default_timeout))
    }

    /// Send with a deadline. Losing the race drops the transport future,
    /// which aborts the call; winning drops the timer.
    async fn dispatch(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse, HttpError> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            timeout_ms = timeout.as_millis() as u64,
            "dispatching request"
        );
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::timeout()),
        }
    }

    /// Steps up to and including the dual-layer check.
    async fn checked_envelope(&self, path: &str, config: RequestConfig) -> Result<(Envelope, u16), HttpError> {
        let config = self.process_request_config(config).await?;
        let (request, timeout) = self.assemble(path, config, true);
        let response = self.dispatch(request, timeout).await?;
        let response = self.process_response(response).await?;

        let status = response.status;
        let envelope = Envelope::decode(status, &response.body);
        envelope.check(status)?;
        tracing::debug!(status, "request succeeded");
        Ok((envelope, status))
    }

    /// Run the full pipeline and return `data` (or the whole envelope when
    /// `data` is absent) as `T`.
    pub async fn request<T: DeserializeOwned>(&self, path: &str, config: RequestConfig) -> Result<T, HttpError> {
        let result = match self.checked_envelope(path, config).await {
            Ok((envelope, status)) => envelope.unwrap(status),
            Err(e) => Err(e),
        };
        self.finish(result).await
    }

    /// Like `request`, but return the typed envelope so the caller can tell
    /// whether `data` was present.
    pub async fn request_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        config: RequestConfig,
    ) -> Result<ApiResponse<T>, HttpError> {
        let result = match self.checked_envelope(path, config).await {
            Ok((envelope, status)) => envelope.into_response(status),
            Err(e) => Err(e),
        };
        self.finish(result).await
    }

    // -----------------------------------------------------------------------
    // Method helpers
    // -----------------------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: Params) -> Result<T, HttpError> {
        self.get_with(path, params, RequestConfig::new()).await
    }

    /// GET with extra config. Params already on `config` win over `params`.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        mut params: Params,
        mut config: RequestConfig,
    ) -> Result<T, HttpError> {
        params.merge(&config.params);
        config.params = params;
        config.method = HttpMethod::Get;
        self.request(path, config).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_with(path, body, RequestConfig::new()).await
    }

    pub async fn post_with<T, B>(&self, path: &str, body: &B, config: RequestConfig) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(HttpMethod::Post, path, body, config).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.put_with(path, body, RequestConfig::new()).await
    }

    pub async fn put_with<T, B>(&self, path: &str, body: &B, config: RequestConfig) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(HttpMethod::Put, path, body, config).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.patch_with(path, body, RequestConfig::new()).await
    }

    pub async fn patch_with<T, B>(&self, path: &str, body: &B, config: RequestConfig) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(HttpMethod::Patch, path, body, config).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.delete_with(path, RequestConfig::new()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(&self, path: &str, mut config: RequestConfig) -> Result<T, HttpError> {
        config.method = HttpMethod::Delete;
        self.request(path, config).await
    }

    /// Body-carrying methods. A body that serializes to `null` (`()` or
    /// `None`) is not sent.
    async fn send_json<T, B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
        mut config: RequestConfig,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = match json_body(body) {
            Ok(body) => body,
            Err(e) => return self.finish(Err(e)).await,
        };
        config.method = method;
        config.body = body;
        self.request(path, config).await
    }

    /// POST a multipart form. Any caller-set `Content-Type` is dropped.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: FormData,
        mut config: RequestConfig,
    ) -> Result<T, HttpError> {
        config.remove_header(CONTENT_TYPE);
        config.method = HttpMethod::Post;
        config.body = Some(RequestBody::Multipart(form));
        self.request(path, config).await
    }

    /// Fetch raw bytes and save them under the download directory.
    ///
    /// Request interceptors and the timeout apply; envelope decoding and
    /// response interceptors do not. Only the final path component of
    /// `filename` is used. Returns the written path.
    pub async fn download(
        &self,
        path: &str,
        filename: Option<&str>,
        config: RequestConfig,
    ) -> Result<PathBuf, HttpError> {
        let result = self.fetch_to_file(path, filename, config).await;
        self.finish(result).await
    }

    async fn fetch_to_file(
        &self,
        path: &str,
        filename: Option<&str>,
        config: RequestConfig,
    ) -> Result<PathBuf, HttpError> {
        let mut config = self.process_request_config(config).await?;
        config.method = HttpMethod::Get;
        let (request, timeout) = self.assemble(path, config, false);
        let response = self.dispatch(request, timeout).await?;

        if !response.is_success() {
            return Err(HttpError::new(
                ErrorKind::HttpStatus,
                format!("download failed: {}", response.status),
                response.status,
            ));
        }

        let target = self.download_dir.join(safe_file_name(filename));
        tokio::fs::write(&target, &response.body)
            .await
            .map_err(|e| HttpError::io(&e))?;
        tracing::debug!(path = %target.display(), bytes = response.body.len(), "download saved");
        Ok(target)
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<Option<RequestBody>, HttpError> {
    let value = serde_json::to_value(body)
        .map_err(|e| HttpError::request(format!("failed to serialize request body: {e}")))?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(RequestBody::Json(value.to_string())))
}

fn safe_file_name(filename: Option<&str>) -> PathBuf {
    filename
        .and_then(|name| Path::new(name).file_name())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_NAME))
}

fn has_scheme(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Absolute URLs pass through; anything else is prefixed with `base`.
pub fn build_url(base: &str, path: &str, params: &Params) -> String {
    let full = if has_scheme(path) {
        path.to_string()
    } else {
        format!("{base}{path}")
    };

    if params.is_empty() {
        return full;
    }

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter() {
        query.append_pair(key, &value.to_string());
    }
    let separator = if full.contains('?') { '&' } else { '?' };
    format!("{full}{separator}{}", query.finish())
}
