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

use super::api_error::ApiError;
use http::HeaderMap;
use std::error::Error as StdError;
use std::sync::Arc;

type BoxError = Box<dyn StdError + Send + Sync>;

/// The HTTP status code reported with cancelled requests.
const REQUEST_TIMEOUT: u16 = 408;
const NOT_MODIFIED: u16 = 304;

/// The core error returned by all client libraries.
///
/// The client libraries report errors from multiple sources. For example, the
/// service may return an error, the transport may be unable to create the
/// necessary connection to make a request, the application may cancel an
/// upload, or the library may be unable to read the data to upload.
///
/// Most applications will just return the error or log it, without any further
/// action. However, some applications may need to interrogate the error
/// details. This type offers a series of predicates to determine the error
/// kind. The type also offers accessors to query the most common error details.
/// Applications can query the error [source][std::error::Error::source] for
/// deeper information.
///
/// # Example
/// ```
/// use google_api_gax::error::Error;
/// match example_function() {
///     Err(e) if e.api_error().is_some() => {
///         println!("service error {e}, debug using {:?}", e.api_error());
///     },
///     Err(e) if e.is_cancelled() => { println!("the upload was cancelled {e}"); },
///     Err(e) => { println!("some other error {e}"); },
///     Ok(_) => { println!("success, how boring"); },
/// }
///
/// fn example_function() -> Result<String, Error> {
///     // ... details omitted ...
///     # use google_api_gax::error::ApiError;
///     # Err(Error::service(ApiError::default().set_code(404).set_message("NOT FOUND")))
/// }
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<BoxError>,
}

impl Error {
    /// Creates an error with the information returned by a Google API.
    ///
    /// # Example
    /// ```
    /// use google_api_gax::error::{ApiError, Error};
    /// let api = ApiError::default().set_code(404).set_message("NOT FOUND");
    /// let error = Error::service(api.clone());
    /// assert_eq!(error.api_error(), Some(&api));
    /// assert_eq!(error.http_status_code(), Some(404));
    /// ```
    pub fn service(error: ApiError) -> Self {
        Self {
            kind: ErrorKind::Service(Box::new(error)),
            source: None,
        }
    }

    /// The error envelope returned by the service, if any.
    ///
    /// # Troubleshooting
    ///
    /// As this error type is typically created by the service, troubleshooting
    /// this problem typically involves reading the service documentation to
    /// root cause the problem.
    ///
    /// Some services include additional details about the error, sometimes
    /// including what fields are missing or have bad values, in the
    /// [errors][ApiError::errors] and [details][ApiError::details] fields. The
    /// raw [body][ApiError::body] is always preserved.
    pub fn api_error(&self) -> Option<&ApiError> {
        match &self.kind {
            ErrorKind::Service(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// The HTTP status code, if any, associated with this error.
    ///
    /// Cancelled requests report `408` (request timeout), as they did not
    /// produce a response from the service.
    ///
    /// # Example
    /// ```
    /// use google_api_gax::error::{ApiError, Error};
    /// let e = search_for_thing("the thing");
    /// if let Some(code) = e.http_status_code() {
    ///     if code == 404 {
    ///         println!("cannot find the thing, more details in {e}");
    ///     }
    /// }
    ///
    /// fn search_for_thing(name: &str) -> Error {
    ///     # Error::service(ApiError::opaque(404, http::HeaderMap::new(), "NOT FOUND"))
    /// }
    /// ```
    pub fn http_status_code(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Service(e) => Some(e.code),
            ErrorKind::Cancelled => Some(REQUEST_TIMEOUT),
            _ => None,
        }
    }

    /// The headers, if any, associated with this error.
    ///
    /// # Example
    /// ```
    /// use google_api_gax::error::{ApiError, Error};
    /// let e = search_for_thing("the thing");
    /// if let Some(headers) = e.http_headers() {
    ///     if let Some(id) = headers.get("x-guploader-uploadid") {
    ///         println!("include this upload id when contacting support {id:?}");
    ///     }
    /// }
    ///
    /// fn search_for_thing(name: &str) -> Error {
    ///     # let mut map = http::HeaderMap::new();
    ///     # map.insert("x-guploader-uploadid", http::HeaderValue::from_static("placeholder"));
    ///     # Error::service(ApiError::opaque(400, map, "NOT FOUND"))
    /// }
    /// ```
    pub fn http_headers(&self) -> Option<&HeaderMap> {
        match &self.kind {
            ErrorKind::Service(e) => Some(&e.headers),
            _ => None,
        }
    }

    /// The raw response body, if any, associated with this error.
    pub fn http_payload(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Service(e) => Some(e.body.as_str()),
            _ => None,
        }
    }

    /// Returns true if the service replied with `304 Not Modified`.
    ///
    /// Generated clients forward `If-None-Match` headers without interpreting
    /// them. Use this predicate to detect that the cached entity is current.
    pub fn is_not_modified(&self) -> bool {
        matches!(&self.kind, ErrorKind::Service(e) if e.code == NOT_MODIFIED)
    }

    /// Creates an error representing a cancelled request or upload.
    ///
    /// # Example
    /// ```
    /// use google_api_gax::error::Error;
    /// let error = Error::cancelled("the application is shutting down");
    /// assert!(error.is_cancelled());
    /// assert_eq!(error.http_status_code(), Some(408));
    /// ```
    pub fn cancelled<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            source: Some(source.into()),
        }
    }

    /// The application cancelled the request.
    ///
    /// Cancellation always takes priority over retries. The request may or may
    /// not have reached the service. Resumable uploads can be resumed using the
    /// same upload session.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates an error representing an exhausted policy.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use google_api_gax::error::Error;
    /// let error = Error::exhausted("the chunk retry deadline expired");
    /// assert!(error.is_exhausted());
    /// assert!(error.source().is_some());
    /// ```
    pub fn exhausted<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Exhausted,
            source: Some(source.into()),
        }
    }

    /// The request could not complete before the retry deadline expired.
    ///
    /// # Troubleshooting
    ///
    /// The source of this error contains the last error observed before the
    /// deadline expired. If the problem is transient, consider increasing the
    /// deadline.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }

    /// The request body or media could not be produced.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use google_api_gax::error::Error;
    /// let error = Error::ser("cannot read the media");
    /// assert!(error.is_serialization());
    /// assert!(error.source().is_some());
    /// ```
    pub fn ser<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Serialization,
            source: Some(source.into()),
        }
    }

    /// The request body or media could not be produced.
    ///
    /// This error is never retried. Reading the media may not be repeatable.
    ///
    /// # Troubleshooting
    ///
    /// Most commonly this indicates a problem reading the data to upload, for
    /// example, a file that cannot be read or a stream that fails midway.
    /// Examine the error [source][std::error::Error::source] for details.
    pub fn is_serialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Serialization)
    }

    /// The response could not be deserialized.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use google_api_gax::error::Error;
    /// let error = Error::deser("simulated problem");
    /// assert!(error.is_deserialization());
    /// assert!(error.source().is_some());
    /// ```
    pub fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Deserialization,
            source: Some(source.into()),
        }
    }

    /// The response could not be deserialized.
    ///
    /// # Troubleshooting
    ///
    /// This typically indicates a mismatch between the types used by the
    /// generated client and the service response, or a proxy returning a
    /// payload that did not come from the service.
    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Deserialization)
    }

    /// The library was used incorrectly.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use google_api_gax::error::Error;
    /// let error = Error::usage("page size must be positive");
    /// assert!(error.is_usage());
    /// assert!(error.source().is_some());
    /// ```
    pub fn usage<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Usage,
            source: Some(source.into()),
        }
    }

    /// The library was used incorrectly.
    ///
    /// These errors are detected locally and never retried.
    ///
    /// # Troubleshooting
    ///
    /// Examine the error [source][std::error::Error::source]. Common causes
    /// include mixing item and page iteration over the same list call, or
    /// calling `upload()` on a completed upload session.
    pub fn is_usage(&self) -> bool {
        matches!(self.kind, ErrorKind::Usage)
    }

    /// A problem in the transport layer without a full HTTP response.
    ///
    /// Examples include: a broken connection after the request is sent, or a
    /// connection that cannot be established.
    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Io,
            source: Some(source.into()),
        }
    }

    /// A problem in the transport layer without a full HTTP response.
    ///
    /// # Troubleshooting
    ///
    /// This indicates a problem completing the request. This type of error is
    /// rare, but includes crashes and restarts on proxies and load balancers.
    /// Resumable uploads retry these errors automatically.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io)
    }
}

impl Error {
    /// Creates a new error with the same kind and message as `recorded`.
    ///
    /// The new error's source is `recorded` itself. Used by types that
    /// return the same terminal error on every call.
    pub(crate) fn replay(recorded: &Arc<Error>) -> Self {
        Self {
            kind: recorded.kind.clone(),
            source: Some(Box::new(Recorded(recorded.clone()))),
        }
    }
}

/// An error returned again after its first occurrence.
#[derive(Debug)]
struct Recorded(Arc<Error>);

impl std::fmt::Display for Recorded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.source {
            Some(e) => write!(f, "{e}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl StdError for Recorded {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.source) {
            (ErrorKind::Service(e), _) => write!(f, "{e}"),
            (ErrorKind::Serialization, Some(e)) => write!(f, "cannot serialize the request {e}"),
            (ErrorKind::Deserialization, Some(e)) => {
                write!(f, "cannot deserialize the response {e}")
            }
            (ErrorKind::Cancelled, Some(e)) => write!(f, "the request was cancelled {e}"),
            (ErrorKind::Exhausted, Some(e)) => write!(f, "{e}"),
            (ErrorKind::Usage, Some(e)) => write!(f, "invalid use of the client library: {e}"),
            (ErrorKind::Io, Some(e)) => write!(f, "the transport reports an error: {e}"),
            (_, None) => unreachable!("no constructor allows this"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Service(e) => Some(e.as_ref() as &(dyn std::error::Error)),
            _ => self
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error)),
        }
    }
}

/// The type of error held by an [Error] instance.
#[derive(Clone, Debug)]
enum ErrorKind {
    Service(Box<ApiError>),
    Serialization,
    Deserialization,
    Cancelled,
    Exhausted,
    Usage,
    Io,
}
