//! Unary call dispatch: header merge, body normalisation, auth, classification.

use super::core::ServiceClient;
use super::headers::HeaderList;
use super::request::{Body, FormBody, FormValue, Request};
use super::response::{ResponseBody, ResponseEnvelope};
use crate::error_code::ErrorClass;
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart;
use serde_json::Value;
use tracing::{debug, warn};

const APPLICATION_JSON: &str = "application/json";

/// Response header carrying the service-side request id.
pub const TRANSACTION_ID_HEADER: &str = "X-Global-Transaction-Id";

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized: Access is denied due to invalid credentials";

impl ServiceClient {
    /// Issue one call and normalise the outcome.
    ///
    /// Non-2xx responses become [`Error::Api`]; connection failures become
    /// [`Error::Transport`]. Nothing is retried.
    pub async fn send(&self, request: &Request) -> Result<ResponseEnvelope> {
        let defaults = self.default_headers();
        let mut headers = prepare_headers(&defaults, request);
        if let Some(value) = self.authenticator().authorization().await? {
            headers.set("Authorization", Some(value));
        }

        let url = join_url(&self.service_url(), request.path());
        let mut builder = self
            .transport()
            .request(request.method().clone(), &url)
            .headers(to_header_map(&headers)?);

        let query = request.query_pairs();
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        builder = match request.body().without_nulls() {
            Body::None => builder,
            Body::Json(value) => builder.body(serde_json::to_vec(&value)?),
            Body::Form(form) => builder.multipart(to_multipart(form)?),
            Body::Raw { data, .. } => builder.body(data),
        };

        debug!(
            service = %self.service_name(),
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = self.transport().send(builder).await?;
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(e.into()))?;

        if (200..300).contains(&status) {
            let content_type = response_headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let body = if request.accept_json() {
                ResponseBody::from_bytes(content_type, &bytes)
            } else if bytes.is_empty() {
                ResponseBody::Empty
            } else {
                ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned())
            };
            if request.accept_json()
                && content_type.is_some_and(|ct| ct.starts_with(APPLICATION_JSON))
                && matches!(body, ResponseBody::Text(_))
            {
                warn!(status, path = %request.path(), "response declared JSON but did not parse");
            }
            debug!(status, path = %request.path(), "request succeeded");
            return Ok(ResponseEnvelope::new(status, response_headers, body));
        }

        let body = ResponseBody::best_effort(&bytes);
        let message = error_message(status, &body);
        let transaction_id = response_headers
            .get(TRANSACTION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status == 401 {
            self.authenticator().on_unauthorized().await;
        }

        debug!(
            status,
            path = %request.path(),
            transaction_id = transaction_id.as_deref().unwrap_or(""),
            "request failed"
        );

        Err(Error::Api {
            status,
            message,
            body,
            class: ErrorClass::from_http_status(status),
            transaction_id,
        })
    }
}

/// Merge defaults with per-call headers, drop nulls, then apply Accept and
/// Content-Type rules for the request's body.
pub(crate) fn prepare_headers(defaults: &HeaderList, request: &Request) -> HeaderList {
    let mut headers = defaults.merged_with(request.headers()).without_nulls();

    if request.accept_json() && !headers.contains("Accept") {
        headers.set("Accept", Some(APPLICATION_JSON.to_string()));
    }

    match request.body().without_nulls() {
        Body::Json(_) => {
            if !headers.contains("Content-Type") {
                headers.set("Content-Type", Some(APPLICATION_JSON.to_string()));
            }
        }
        Body::Raw { content_type, .. } => {
            if !headers.contains("Content-Type") {
                headers.set("Content-Type", Some(content_type));
            }
        }
        Body::Form(_) | Body::None => {
            headers.remove("Content-Type");
        }
    }
    headers
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn to_header_map(headers: &HeaderList) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid header name: {}", e),
                ErrorContext::new()
                    .with_field_path(format!("request.headers.{}", name))
                    .with_source("dispatcher"),
            )
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid header value: {}", e),
                ErrorContext::new()
                    .with_field_path(format!("request.headers.{}", name))
                    .with_source("dispatcher"),
            )
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

fn to_multipart(form: FormBody) -> Result<multipart::Form> {
    let mut out = multipart::Form::new();
    for part in form.parts() {
        let built = match &part.value {
            FormValue::Text(text) => multipart::Part::text(text.clone()),
            FormValue::File {
                data,
                filename,
                content_type,
            } => {
                let mut p = multipart::Part::bytes(data.to_vec());
                if let Some(name) = filename {
                    p = p.file_name(name.clone());
                }
                if let Some(ct) = content_type {
                    p = p.mime_str(ct).map_err(|e| {
                        Error::configuration_with_context(
                            format!("invalid part content type: {}", e),
                            ErrorContext::new()
                                .with_field_path(format!("request.form.{}", part.name))
                                .with_source("dispatcher"),
                        )
                    })?;
                }
                p
            }
        };
        out = out.part(part.name.clone(), built);
    }
    Ok(out)
}

/// Human-readable message from an error body, falling back to the status reason.
pub(crate) fn error_message(status: u16, body: &ResponseBody) -> String {
    let extracted = match body {
        ResponseBody::Json(value) => message_from_json(value),
        ResponseBody::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    };
    if let Some(message) = extracted {
        return message;
    }
    if status == 401 {
        return UNAUTHORIZED_MESSAGE.to_string();
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn message_from_json(value: &Value) -> Option<String> {
    let as_text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    as_text(value.get("error"))
        .or_else(|| as_text(value.get("errorMessage")))
        .or_else(|| as_text(value.get("message")))
        .or_else(|| {
            as_text(
                value
                    .get("errors")
                    .and_then(|e| e.get(0))
                    .and_then(|e| e.get("message")),
            )
        })
        .or_else(|| as_text(value.get("error").and_then(|e| e.get("message"))))
        .or_else(|| as_text(value.get("error_description")))
}
