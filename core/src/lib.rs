//! Async API client core for the payment dashboard backend.
//!
//! # Overview
//! Every backend call goes through one `HttpClient`. It resolves the base
//! URL, runs request/response/error interceptors in registration order,
//! bounds each call with a timeout, decodes the `{code, message, data}`
//! envelope and reports every failure as a single `HttpError`.
//!
//! # Design
//! - The network sits behind the `Transport` trait; `ReqwestTransport` is the
//!   default and tests substitute scripted transports.
//! - Session data (bearer token, refresh token, cached user) lives behind the
//!   `SessionStore` trait, injected into the auth interceptors.
//! - `HttpClient::with_defaults` wires the standard interceptors: bearer
//!   injection and session clearing on 401.
//! - `api` holds thin typed wrappers for the app, order, payment and auth
//!   endpoints.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod request;
pub mod session;
pub mod transport;
pub mod types;

pub use api::{AppApi, AuthApi, ExportFormat, OrderApi, PaymentApi};
pub use auth::{AuthExpiry, BearerAuth, SESSION_EXPIRED_MESSAGE};
pub use client::{build_url, HttpClient};
pub use config::{load_config, ClientConfig};
pub use envelope::ApiResponse;
pub use error::{ConfigError, ErrorKind, HttpError};
pub use http::{FormData, FormPart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
pub use interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
pub use request::{ParamValue, Params, RequestConfig};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use transport::{ReqwestTransport, Transport};
