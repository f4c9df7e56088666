//! Interceptor traits for the three pipeline stages.
//!
//! Interceptors are registered on an `HttpClient` before it is shared and run
//! strictly in registration order within a single request. Each one receives
//! the previous one's output.
//!
//! Plain closures implement the traits, so simple cases need no struct:
//!
//! ```ignore
//! client.add_request_interceptor(|mut config: RequestConfig| -> Result<RequestConfig, HttpError> {
//!     config.set_header("X-Trace", "1");
//!     Ok(config)
//! });
//! ```

use async_trait::async_trait;

use crate::error::HttpError;
use crate::http::HttpResponse;
use crate::request::RequestConfig;

/// Transforms the request config before the URL and headers are assembled.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, HttpError>;
}

/// Transforms the raw response before envelope decoding.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(&self, response: HttpResponse) -> Result<HttpResponse, HttpError>;
}

/// Rewrites an error before it is returned to the caller.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn on_error(&self, error: HttpError) -> HttpError;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(RequestConfig) -> Result<RequestConfig, HttpError> + Send + Sync,
{
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, HttpError> {
        self(config)
    }
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(HttpResponse) -> Result<HttpResponse, HttpError> + Send + Sync,
{
    async fn on_response(&self, response: HttpResponse) -> Result<HttpResponse, HttpError> {
        self(response)
    }
}

#[async_trait]
impl<F> ErrorInterceptor for F
where
    F: Fn(HttpError) -> HttpError + Send + Sync,
{
    async fn on_error(&self, error: HttpError) -> HttpError {
        self(error)
    }
}
