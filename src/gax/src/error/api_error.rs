// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// The error envelope returned by Google APIs.
///
/// Unsuccessful responses from Google APIs carry a JSON body with the shape:
///
/// ```json
/// {"error": {"code": 404, "message": "not found", "errors": [{"reason": "notFound", "message": "not found"}]}}
/// ```
///
/// The client libraries decode such payloads into this type. If the body is
/// not a valid envelope the client libraries still return this type, with the
/// HTTP status code in `code` and the raw body in `body`.
///
/// # Example
/// ```
/// # use google_api_gax::error::{ApiError, ErrorItem};
/// let error = ApiError::default()
///     .set_code(404)
///     .set_message("not found")
///     .set_errors([ErrorItem::default().set_reason("notFound").set_message("not found")]);
/// assert_eq!(error.to_string(), "googleapi: Error 404: not found, notFound");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct ApiError {
    /// The HTTP status code, or the code reported in the envelope if present.
    pub code: u16,

    /// The server-supplied message, may be empty.
    pub message: String,

    /// Additional error items, some APIs return one per failed field.
    pub errors: Vec<ErrorItem>,

    /// Structured error details, kept as raw JSON values.
    pub details: Vec<serde_json::Value>,

    /// The raw response body, useful for troubleshooting.
    pub body: String,

    /// The response headers.
    pub headers: HeaderMap,
}

impl ApiError {
    /// Sets the value for [code][ApiError::code].
    pub fn set_code(mut self, v: u16) -> Self {
        self.code = v;
        self
    }

    /// Sets the value for [message][ApiError::message].
    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }

    /// Sets the value for [errors][ApiError::errors].
    pub fn set_errors<T, I>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<ErrorItem>,
    {
        self.errors = v.into_iter().map(|i| i.into()).collect();
        self
    }

    /// Sets the value for [details][ApiError::details].
    pub fn set_details<T>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = serde_json::Value>,
    {
        self.details = v.into_iter().collect();
        self
    }

    /// Sets the value for [body][ApiError::body].
    pub fn set_body<T: Into<String>>(mut self, v: T) -> Self {
        self.body = v.into();
        self
    }

    /// Sets the value for [headers][ApiError::headers].
    pub fn set_headers(mut self, v: HeaderMap) -> Self {
        self.headers = v;
        self
    }

    /// Decodes the error envelope from an unsuccessful HTTP response.
    ///
    /// The body is kept verbatim in [body][ApiError::body]. If the body is a
    /// valid `{"error": {...}}` envelope its fields are used, and a missing
    /// `code` defaults to `status_code`. Otherwise the error only carries the
    /// status code, the headers, and the raw body.
    ///
    /// # Example
    /// ```
    /// # use google_api_gax::error::ApiError;
    /// let body = br#"{"error":{"code":404,"message":"not found"}}"#;
    /// let error = ApiError::from_http(404, http::HeaderMap::new(), body);
    /// assert_eq!(error.code, 404);
    /// assert_eq!(error.message, "not found");
    /// ```
    pub fn from_http(status_code: u16, headers: HeaderMap, body: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(body).into_owned();
        match serde_json::from_slice::<ErrorReply>(body) {
            Ok(ErrorReply { error: Some(e) }) => Self {
                code: if e.code == 0 { status_code } else { e.code },
                message: e.message,
                errors: e.errors,
                details: e.details,
                body: raw,
                headers,
            },
            _ => Self::opaque(status_code, headers, raw),
        }
    }

    /// Creates an error without parsing the body.
    ///
    /// Media downloads and uploads return arbitrary payloads on errors, the
    /// client libraries report them as opaque diagnostic text.
    pub fn opaque<T: Into<String>>(status_code: u16, headers: HeaderMap, body: T) -> Self {
        Self {
            code: status_code,
            body: body.into(),
            headers,
            ..Default::default()
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() && self.message.is_empty() {
            return write!(
                f,
                "googleapi: got HTTP response code {} with body: {}",
                self.code, self.body
            );
        }
        let mut buf = format!("googleapi: Error {}: {}", self.code, self.message);
        if !self.details.is_empty() {
            if let Ok(details) = serde_json::to_string_pretty(&self.details) {
                buf.push_str("\nDetails:\n");
                buf.push_str(&details);
                buf.push('\n');
            }
        }
        match self.errors.as_slice() {
            [] => f.write_str(buf.trim()),
            [single] if single.message == self.message => {
                write!(f, "{buf}, {}", single.reason)
            }
            items => {
                buf.push_str("\nMore details:\n");
                for item in items {
                    buf.push_str(&format!(
                        "Reason: {}, Message: {}\n",
                        item.reason, item.message
                    ));
                }
                f.write_str(&buf)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// One entry in the `errors` list of an [ApiError].
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ErrorItem {
    /// A machine-readable reason, e.g. `notFound` or `rateLimitExceeded`.
    pub reason: String,
    /// A human-readable description.
    pub message: String,
}

impl ErrorItem {
    /// Sets the value for [reason][ErrorItem::reason].
    pub fn set_reason<T: Into<String>>(mut self, v: T) -> Self {
        self.reason = v.into();
        self
    }

    /// Sets the value for [message][ErrorItem::message].
    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireError {
    code: u16,
    message: String,
    errors: Vec<ErrorItem>,
    details: Vec<serde_json::Value>,
}
