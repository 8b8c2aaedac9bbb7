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

//! Configuration for media uploads.

use crate::chunker::{DEFAULT_UPLOAD_CHUNK_SIZE, round_chunk_size};
use futures::future::BoxFuture;
use gax::backoff_policy::{BackoffPolicy, BackoffPolicyArg};
use gax::exponential_backoff::ExponentialBackoff;
use gaxi::api_header::ApiClient;
use std::sync::Arc;
use std::time::Duration;

/// Receives the number of bytes persisted by the service.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Waits between retry attempts.
///
/// The default implementation uses [tokio::time::sleep]. Tests replace it to
/// verify the backoff delays without waiting.
pub trait Sleep: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// The default [Sleep] implementation.
#[derive(Clone, Debug, Default)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Options for a media upload.
///
/// # Example
/// ```
/// # use google_api_media::options::MediaOptions;
/// use gax::exponential_backoff::ExponentialBackoffBuilder;
/// use std::time::Duration;
///
/// let options = MediaOptions::new()
///     .with_content_type("image/png")
///     .with_chunk_size(8 * 1024 * 1024)
///     .with_progress(|n| println!("{n} bytes uploaded"))
///     .with_backoff_policy(
///         ExponentialBackoffBuilder::new()
///             .with_initial_delay(Duration::from_millis(250))
///             .clamp(),
///     );
/// assert_eq!(options.chunk_size(), 8 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct MediaOptions {
    pub(crate) content_type: Option<String>,
    pub(crate) force_empty_content_type: bool,
    pub(crate) chunk_size: i64,
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) backoff_policy: Arc<dyn BackoffPolicy>,
    pub(crate) chunk_retry_deadline: Option<Duration>,
    pub(crate) user_agent: String,
    pub(crate) api_client: Option<&'static ApiClient>,
    pub(crate) sleep: Arc<dyn Sleep>,
}

impl MediaOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the media type, disabling content type detection.
    pub fn with_content_type<V: Into<String>>(mut self, v: V) -> Self {
        self.content_type = Some(v.into());
        self
    }

    /// Upload the media without a content type.
    ///
    /// This disables content type detection, and ignores any content type
    /// set via [with_content_type][MediaOptions::with_content_type].
    pub fn with_force_empty_content_type(mut self, v: bool) -> Self {
        self.force_empty_content_type = v;
        self
    }

    /// Sets the chunk size for resumable uploads.
    ///
    /// The value is rounded up to a multiple of
    /// [MIN_UPLOAD_CHUNK_SIZE][crate::chunker::MIN_UPLOAD_CHUNK_SIZE]. Zero or
    /// negative values restore the default.
    pub fn with_chunk_size(mut self, v: i64) -> Self {
        self.chunk_size = round_chunk_size(v);
        self
    }

    /// The configured chunk size, zero or negative values mean the default.
    pub fn chunk_size(&self) -> i64 {
        self.chunk_size
    }

    /// Receive progress notifications.
    ///
    /// The callback is invoked each time the service reports more bytes
    /// persisted. It is never called twice with the same value.
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(f));
        self
    }

    /// Sets the backoff policy between retry attempts.
    pub fn with_backoff_policy<V: Into<BackoffPolicyArg>>(mut self, v: V) -> Self {
        let arg: BackoffPolicyArg = v.into();
        self.backoff_policy = arg.into();
        self
    }

    /// Stop retrying a chunk after `v` elapses without progress.
    ///
    /// By default the upload retries failed chunks until it succeeds, it is
    /// cancelled, or the media cannot be read.
    pub fn with_chunk_retry_deadline(mut self, v: Duration) -> Self {
        self.chunk_retry_deadline = Some(v);
        self
    }

    /// Sets the `User-Agent` header.
    pub fn with_user_agent<V: Into<String>>(mut self, v: V) -> Self {
        self.user_agent = v.into();
        self
    }

    /// Identifies the generated client making the requests.
    ///
    /// Sets the `User-Agent` and `x-goog-api-client` headers.
    pub fn with_api_client(mut self, v: &'static ApiClient) -> Self {
        self.user_agent = v.user_agent();
        self.api_client = Some(v);
        self
    }

    /// Replaces the function used to wait between retry attempts.
    pub fn with_sleep<V: Sleep + 'static>(mut self, v: V) -> Self {
        self.sleep = Arc::new(v);
        self
    }

    pub(crate) fn buffer_size(&self) -> usize {
        let size = match self.chunk_size {
            n if n > 0 => n,
            _ => DEFAULT_UPLOAD_CHUNK_SIZE,
        };
        usize::try_from(size).unwrap_or(usize::MAX)
    }
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            force_empty_content_type: false,
            chunk_size: 0,
            progress: None,
            backoff_policy: Arc::new(ExponentialBackoff::default()),
            chunk_retry_deadline: None,
            user_agent: gaxi::api_header::default_user_agent(),
            api_client: None,
            sleep: Arc::new(TokioSleep),
        }
    }
}

impl std::fmt::Debug for MediaOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaOptions")
            .field("content_type", &self.content_type)
            .field("force_empty_content_type", &self.force_empty_content_type)
            .field("chunk_size", &self.chunk_size)
            .field("progress", &self.progress.as_ref().map(|_| "..."))
            .field("backoff_policy", &self.backoff_policy)
            .field("chunk_retry_deadline", &self.chunk_retry_deadline)
            .field("user_agent", &self.user_agent)
            .field("api_client", &self.api_client)
            .field("sleep", &self.sleep)
            .finish()
    }
}
