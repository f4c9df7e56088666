//! Authentication interceptors installed on the default client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HttpError;
use crate::interceptor::{ErrorInterceptor, RequestInterceptor};
use crate::request::RequestConfig;
use crate::session::{Session, SessionStore};

/// Message that replaces any error carrying HTTP 401.
pub const SESSION_EXPIRED_MESSAGE: &str = "session expired, please log in again";

/// Adds `Authorization: Bearer <token>` when the store holds a token.
///
/// A missing token leaves the headers untouched; it is never an error here.
pub struct BearerAuth {
    session: Session,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            session: Session::new(store),
        }
    }
}

#[async_trait]
impl RequestInterceptor for BearerAuth {
    async fn on_request(&self, mut config: RequestConfig) -> Result<RequestConfig, HttpError> {
        match self.session.token() {
            Some(token) => {
                config.set_header("Authorization", format!("Bearer {token}"));
                tracing::trace!("authorization header attached");
            }
            None => tracing::trace!("no session token; sending unauthenticated"),
        }
        Ok(config)
    }
}

/// Clears the session and rewrites the message on HTTP 401.
///
/// Navigation back to a login screen is left to the caller.
pub struct AuthExpiry {
    session: Session,
}

impl AuthExpiry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            session: Session::new(store),
        }
    }
}

#[async_trait]
impl ErrorInterceptor for AuthExpiry {
    async fn on_error(&self, mut error: HttpError) -> HttpError {
        if error.is_auth_expired() {
            tracing::info!("received 401; clearing session");
            self.session.clear();
            error.message = SESSION_EXPIRED_MESSAGE.to_string();
        }
        error
    }
}
