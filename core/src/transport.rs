//! The network boundary.
//!
//! # Design
//! `HttpClient` never talks to an HTTP library directly; it hands a fully
//! assembled `HttpRequest` to a `Transport` and awaits an `HttpResponse`.
//! Cancellation is the future being dropped: the client races `send` against
//! its timer, and whichever loses is dropped, taking the in-flight connection
//! (or the timer) with it. Implementations must therefore be cancel-safe,
//! which any `reqwest`/`hyper` based future already is.
//!
//! Non-2xx statuses are data, not errors. A transport returns `Err` only when
//! no response was received at all.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Method;

use crate::error::HttpError;
use crate::http::{FormData, FormPart, HttpMethod, HttpRequest, HttpResponse, RequestBody};

/// Executes one HTTP round-trip.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Default transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::request(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::request(format!("invalid header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn multipart_form(form: FormData) -> Result<Form, HttpError> {
    let mut out = Form::new();
    for part in form.parts {
        out = match part {
            FormPart::Text { name, value } => out.text(name, value),
            FormPart::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                let mut file = Part::bytes(bytes).file_name(filename);
                if let Some(mime) = content_type {
                    file = file
                        .mime_str(&mime)
                        .map_err(|e| HttpError::request(format!("invalid content type {mime:?}: {e}")))?;
                }
                out.part(name, file)
            }
        };
    }
    Ok(out)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .client
            .request(method(request.method), &request.url)
            .headers(header_map(&request.headers)?);

        builder = match request.body {
            Some(RequestBody::Json(text)) => builder.body(text),
            Some(RequestBody::Multipart(form)) => builder.multipart(multipart_form(form)?),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                HttpError::request(e.to_string())
            } else {
                HttpError::network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::network(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_rejects_bad_names() {
        let err = header_map(&[("bad header".to_string(), "x".to_string())]).unwrap_err();
        assert_eq!(err.status, 0);
        assert_eq!(err.kind, crate::error::ErrorKind::Request);
    }

    #[test]
    fn header_map_keeps_values() {
        let map = header_map(&[("Authorization".to_string(), "Bearer abc".to_string())]).unwrap();
        assert_eq!(map.get("authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn multipart_rejects_bad_mime() {
        let form = FormData::new().file("f", "a.bin", Some("not a mime"), vec![0]);
        assert!(multipart_form(form).is_err());
    }
}
