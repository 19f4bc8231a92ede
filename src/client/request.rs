//! Request values handed to the dispatcher.

use super::headers::HeaderList;
use bytes::Bytes;
use reqwest::Method;
use serde_json::{Map, Value};

/// An inline value or a byte payload inside a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        data: Bytes,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

/// Multipart form body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormBody {
    parts: Vec<FormPart>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    /// Add a text part only when `value` is present.
    pub fn text_opt(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.text(name, v),
            None => self,
        }
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        filename: Option<String>,
        content_type: Option<String>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::File {
                data: data.into(),
                filename,
                content_type,
            },
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }
}

/// Explicit body representation; the dispatcher never inspects runtime types.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    None,
    Json(Value),
    Form(FormBody),
    Raw { data: Bytes, content_type: String },
}

impl Body {
    /// Merge a legacy `data` object with a structured `json` object; `json` keys win.
    ///
    /// When either side is not an object the non-null one is used, preferring `json`.
    pub fn json_merged(data: Value, json: Value) -> Body {
        match (data, json) {
            (Value::Object(mut base), Value::Object(overlay)) => {
                base.extend(overlay);
                Body::Json(Value::Object(base))
            }
            (data, Value::Null) => Body::Json(data),
            (_, json) => Body::Json(json),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    /// Drop null-valued keys from a top-level JSON object. Idempotent.
    pub fn without_nulls(&self) -> Body {
        match self {
            Body::Json(Value::Object(map)) => {
                let cleaned: Map<String, Value> = map
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Body::Json(Value::Object(cleaned))
            }
            Body::Json(Value::Null) => Body::None,
            other => other.clone(),
        }
    }
}

/// One logical call: method, path relative to the service URL, headers, query, body.
///
/// Built through [`RequestBuilder`] and immutable afterwards; per-call headers
/// live here rather than on the shared client.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderList,
    query: Vec<(String, Option<String>)>,
    body: Body,
    accept_json: bool,
}

impl Request {
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            inner: Request {
                method,
                path: path.into(),
                headers: HeaderList::new(),
                query: Vec::new(),
                body: Body::None,
                accept_json: true,
            },
        }
    }

    pub fn get(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::DELETE, path)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    /// Query pairs with null values removed, in insertion order.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
            .collect()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn accept_json(&self) -> bool {
        self.accept_json
    }
}

pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.set(name, Some(value.into()));
        self
    }

    /// A header that is dropped when `value` is `None`.
    pub fn header_opt(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.inner.headers.set(name, value.map(Into::into));
        self
    }

    pub fn headers(mut self, headers: &HeaderList) -> Self {
        self.inner.headers = self.inner.headers.merged_with(headers);
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.inner.query.push((name.into(), Some(value.to_string())));
        self
    }

    /// A query parameter that is dropped when `value` is `None`.
    pub fn query_opt<V: ToString>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.inner
            .query
            .push((name.into(), value.map(|v| v.to_string())));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.inner.body = Body::Json(value);
        self
    }

    pub fn form(mut self, form: FormBody) -> Self {
        self.inner.body = Body::Form(form);
        self
    }

    pub fn raw(mut self, data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.inner.body = Body::Raw {
            data: data.into(),
            content_type: content_type.into(),
        };
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.inner.body = body;
        self
    }

    /// Whether the response should be requested (and parsed) as JSON. Defaults to true.
    pub fn accept_json(mut self, accept: bool) -> Self {
        self.inner.accept_json = accept;
        self
    }

    pub fn build(self) -> Request {
        self.inner
    }
}
