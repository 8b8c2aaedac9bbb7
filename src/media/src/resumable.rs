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

//! Sends the media in a [resumable upload] session.
//!
//! The generated client starts the session (a request with
//! `uploadType=resumable`) and receives the session URI in the `Location`
//! header. This module sends the media to that URI, one chunk at a time.
//!
//! Each chunk is sent with a `Content-Range` header. The service replies
//! with `308 Resume Incomplete` until it receives the final chunk, and then
//! with `200 OK` or `201 Created`. Any other response, and any error sending
//! the request, is retried with backoff. The upload queries the service for
//! the persisted size before retrying.
//!
//! [resumable upload]: https://cloud.google.com/storage/docs/performing-resumable-uploads

use crate::chunker::{Chunk, Chunker};
use crate::error::UploadError;
use crate::options::{MediaOptions, ProgressCallback, Sleep};
use gax::Result;
use gax::backoff_policy::BackoffPolicy;
use gax::error::Error;
use http::HeaderValue;
use http::header::{CONTENT_RANGE, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const RESUME_INCOMPLETE: StatusCode = StatusCode::PERMANENT_REDIRECT;

/// The state of a [ResumableUpload].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// `upload()` was never called.
    NotStarted,
    /// Sending a chunk or querying the session status.
    Transferring,
    /// The service persisted part of the media.
    Incomplete,
    Completed,
    Failed,
    Canceled,
}

impl UploadState {
    /// Returns true if the session cannot be used again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Transferring => "transferring",
            Self::Incomplete => "incomplete",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// The number of bytes persisted by the service.
///
/// Clones share the same counter, the application can read it from any task
/// while the upload makes progress.
#[derive(Clone, Debug, Default)]
pub struct ProgressHandle(Arc<AtomicU64>);

impl ProgressHandle {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns true if `value` is larger than the current progress.
    fn advance(&self, value: u64) -> bool {
        self.0.fetch_max(value, Ordering::AcqRel) < value
    }
}

/// A resumable upload session.
///
/// Create instances with [MediaInfo::resumable_upload] or
/// [MediaInfo::resume_upload].
///
/// [MediaInfo::resumable_upload]: crate::media_info::MediaInfo::resumable_upload
/// [MediaInfo::resume_upload]: crate::media_info::MediaInfo::resume_upload
pub struct ResumableUpload {
    client: reqwest::Client,
    uri: String,
    media_type: Option<String>,
    user_agent: String,
    api_client: Option<HeaderValue>,
    chunker: Box<dyn Chunker>,
    progress: ProgressHandle,
    callback: Option<ProgressCallback>,
    backoff: Arc<dyn BackoffPolicy>,
    sleep: Arc<dyn Sleep>,
    chunk_retry_deadline: Option<Duration>,
    state: UploadState,
    needs_probe: bool,
}

enum Status {
    Completed(reqwest::Response),
    Persisted(u64),
}

impl ResumableUpload {
    pub(crate) fn new(
        client: reqwest::Client,
        uri: String,
        media_type: Option<String>,
        chunker: Box<dyn Chunker>,
        options: MediaOptions,
    ) -> Self {
        Self {
            client,
            uri,
            media_type,
            user_agent: options.user_agent,
            api_client: options.api_client.map(|c| c.header_value()),
            chunker,
            progress: ProgressHandle::default(),
            callback: options.progress,
            backoff: options.backoff_policy,
            sleep: options.sleep,
            chunk_retry_deadline: options.chunk_retry_deadline,
            state: UploadState::NotStarted,
            needs_probe: false,
        }
    }

    /// Query the service for the persisted size before sending any data.
    pub(crate) fn with_probe(mut self) -> Self {
        self.needs_probe = true;
        self
    }

    /// The session URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// The number of bytes persisted by the service.
    pub fn progress(&self) -> u64 {
        self.progress.get()
    }

    /// Returns a handle to poll the progress from other tasks.
    pub fn progress_handle(&self) -> ProgressHandle {
        self.progress.clone()
    }

    /// Sends the media and returns the final response.
    ///
    /// Failed requests are retried until the upload succeeds, `cancel` is
    /// triggered, or the media cannot be read. The application owns the
    /// response body, which typically contains the created resource.
    ///
    /// # Example
    /// ```
    /// # use google_api_media::resumable::ResumableUpload;
    /// # use tokio_util::sync::CancellationToken;
    /// # async fn sample(mut upload: ResumableUpload) -> gax::Result<()> {
    /// let cancel = CancellationToken::new();
    /// let response = upload.upload(&cancel).await?;
    /// println!("upload completed with status {}", response.status());
    /// # Ok(()) }
    /// ```
    pub async fn upload(&mut self, cancel: &CancellationToken) -> Result<reqwest::Response> {
        if self.state.is_terminal() {
            return Err(Error::usage(UploadError::Terminated(self.state.name())));
        }
        let result = self.drive(cancel).await;
        self.state = match &result {
            Ok(_) => UploadState::Completed,
            Err(e) if e.is_cancelled() => UploadState::Canceled,
            Err(_) => UploadState::Failed,
        };
        result
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<reqwest::Response> {
        let mut offset = self.progress.get();
        let mut loop_start = Instant::now();
        let mut attempt_count = 0_u32;
        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            self.state = UploadState::Transferring;
            if self.needs_probe {
                match self.probe(cancel).await {
                    Ok(Status::Completed(response)) => {
                        tracing::info!("upload session already completed");
                        if let Some(size) = self.chunker.size() {
                            self.report(size);
                        }
                        return Ok(response);
                    }
                    Ok(Status::Persisted(persisted)) => {
                        tracing::debug!("the service persisted {persisted} bytes");
                        self.needs_probe = false;
                        offset = persisted;
                        self.report(persisted);
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        self.on_failure(e, loop_start, &mut attempt_count, cancel)
                            .await?;
                        continue;
                    }
                }
            }

            // Errors reading the media are not retryable.
            let chunk = self.chunker.chunk_at(offset).await?;
            tracing::debug!("sending chunk {}", chunk.content_range());
            let response = match self.send_chunk(&chunk, cancel).await {
                Ok(r) => r,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    self.needs_probe = true;
                    self.on_failure(e, loop_start, &mut attempt_count, cancel)
                        .await?;
                    continue;
                }
            };
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    self.report(chunk.end());
                    tracing::info!("upload completed after {} bytes", chunk.end());
                    return Ok(response);
                }
                RESUME_INCOMPLETE => {
                    let persisted = match parse_range_end(response.headers()) {
                        Some(Ok(end)) => end + 1,
                        Some(Err(e)) => {
                            self.needs_probe = true;
                            self.on_failure(e, loop_start, &mut attempt_count, cancel)
                                .await?;
                            continue;
                        }
                        None => chunk.end(),
                    };
                    if persisted > chunk.end() {
                        return Err(Error::ser(UploadError::TooMuchProgress {
                            sent: chunk.end(),
                            persisted,
                        }));
                    }
                    offset = persisted;
                    self.report(persisted);
                    self.state = UploadState::Incomplete;
                    loop_start = Instant::now();
                    attempt_count = 0;
                }
                _ => {
                    let err = match gaxi::http::check_media_response(response).await {
                        Err(e) => e,
                        Ok(r) => Error::deser(format!(
                            "unexpected status code {} in resumable upload",
                            r.status()
                        )),
                    };
                    self.needs_probe = true;
                    self.on_failure(err, loop_start, &mut attempt_count, cancel)
                        .await?;
                }
            }
        }
    }

    /// Waits before the next attempt, unless the upload should stop.
    async fn on_failure(
        &self,
        error: Error,
        loop_start: Instant,
        attempt_count: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        *attempt_count = attempt_count.saturating_add(1);
        if let Some(deadline) = self.chunk_retry_deadline {
            if loop_start.elapsed() >= deadline {
                tracing::warn!(
                    "giving up after {attempt_count} attempts without progress: {error}"
                );
                return Err(Error::exhausted(error));
            }
        }
        let delay = self
            .backoff
            .on_failure(loop_start.into_std(), *attempt_count);
        tracing::warn!("upload attempt {attempt_count} failed, retrying in {delay:?}: {error}");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            _ = self.sleep.sleep(delay) => Ok(()),
        }
    }

    /// Queries the service for the persisted size.
    async fn probe(&self, cancel: &CancellationToken) -> Result<Status> {
        let builder = self.request().header(CONTENT_RANGE, "bytes */*");
        let response = self.send(builder, cancel).await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(Status::Completed(response)),
            RESUME_INCOMPLETE => match parse_range_end(response.headers()) {
                // A missing `Range:` header indicates that no bytes are persisted.
                None => Ok(Status::Persisted(0)),
                Some(end) => end.map(|e| Status::Persisted(e + 1)),
            },
            status => {
                gaxi::http::check_media_response(response).await?;
                Err(Error::deser(format!(
                    "unexpected status code {status} querying resumable upload"
                )))
            }
        }
    }

    async fn send_chunk(
        &self,
        chunk: &Chunk,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let builder = self
            .request()
            .header(CONTENT_RANGE, chunk.content_range());
        let builder = match &self.media_type {
            Some(t) => builder.header(CONTENT_TYPE, t),
            None => builder,
        };
        self.send(builder.body(chunk.data().clone()), cancel).await
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .put(&self.uri)
            .header(USER_AGENT, &self.user_agent);
        match &self.api_client {
            Some(v) => builder.header(gaxi::api_header::X_GOOG_API_CLIENT, v.clone()),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            r = builder.send() => r.map_err(gaxi::http::map_send_error),
        }
    }

    fn report(&self, persisted: u64) {
        if !self.progress.advance(persisted) {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(persisted);
        }
    }
}

impl std::fmt::Debug for ResumableUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableUpload")
            .field("uri", &self.uri)
            .field("media_type", &self.media_type)
            .field("progress", &self.progress)
            .field("state", &self.state)
            .field("needs_probe", &self.needs_probe)
            .finish()
    }
}

fn cancelled() -> Error {
    Error::cancelled("the upload was cancelled")
}

/// Parses the `Range:` header in a `308 Resume Incomplete` response.
///
/// Returns the last byte persisted, or `None` if the header is missing.
fn parse_range_end(headers: &http::HeaderMap) -> Option<Result<u64>> {
    let range = headers.get("range")?;
    // Uploads are sequential, the persisted range always starts at zero.
    let end = range
        .to_str()
        .ok()
        .and_then(|r| r.strip_prefix("bytes=0-"))
        .and_then(|e| e.parse::<u64>().ok())
        .ok_or_else(|| Error::deser(format!("malformed Range header: {range:?}")));
    Some(end)
}
