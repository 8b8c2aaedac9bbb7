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

//! Composes `multipart/related` bodies for simple uploads.
//!
//! A simple upload sends the resource metadata (as JSON) and the media in a
//! single request. The body is streamed, neither part is fully buffered in
//! memory.

use crate::source::StreamingSource;
use bytes::Bytes;
use gax::Result;
use gax::error::Error;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The number of buffers queued between the producer and the consumer.
const CHANNEL_DEPTH: usize = 4;

/// A failure reading one of the parts.
#[derive(thiserror::Error, Debug)]
#[error("cannot read the {part} part of the multipart body")]
pub struct PartError {
    part: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl PartError {
    /// The name of the part, `metadata` or `media`.
    pub fn part(&self) -> &'static str {
        self.part
    }
}

/// Combines `body` and `media` into a `multipart/related` body.
///
/// Returns the body and the value of its `Content-Type` header. The parts
/// are read by a background task, which stops if the returned body is closed
/// or dropped. Must be called from within a tokio runtime.
///
/// A part type of `None` omits the `Content-Type` header of that part.
///
/// # Example
/// ```
/// # use google_api_media::multipart::combine_body_media;
/// # use google_api_media::source::BytesSource;
/// # async fn sample() {
/// let metadata = BytesSource::new(bytes::Bytes::from_static(br#"{"name":"greeting.txt"}"#));
/// let media = BytesSource::new(bytes::Bytes::from_static(b"hello world"));
/// let (body, content_type) =
///     combine_body_media(metadata, Some("application/json"), media, Some("text/plain"));
/// assert!(content_type.starts_with("multipart/related; boundary="));
/// let body = body.into_body();
/// # }
/// ```
pub fn combine_body_media<B, M>(
    body: B,
    body_type: Option<&str>,
    media: M,
    media_type: Option<&str>,
) -> (MultipartBody, String)
where
    B: StreamingSource + Send + 'static,
    M: StreamingSource + Send + 'static,
{
    let boundary = new_boundary();
    let content_type = format!("multipart/related; boundary={boundary}");
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let writer = Writer { tx, boundary };
    let body_type = body_type.map(str::to_string);
    let media_type = media_type.map(str::to_string);
    let producer = tokio::spawn(async move {
        if writer.write(body, body_type, media, media_type).await {
            tracing::debug!("multipart body completed");
        } else {
            tracing::debug!("multipart body stopped before completion");
        }
    });
    (MultipartBody { rx, producer }, content_type)
}

/// A streaming `multipart/related` body.
///
/// Created by [combine_body_media]. The body is a [futures::Stream] of
/// buffers, any failure reading the parts is returned as an error.
#[derive(Debug)]
pub struct MultipartBody {
    rx: mpsc::Receiver<Result<Bytes>>,
    producer: JoinHandle<()>,
}

impl MultipartBody {
    /// Stops composing the body.
    ///
    /// Applications that stop reading the body before the end should call
    /// this function to release the parts. Dropping the body has the same
    /// effect. Buffers already produced can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Converts the body for use in a request.
    pub fn into_body(self) -> reqwest::Body {
        reqwest::Body::wrap_stream(self)
    }
}

impl futures::Stream for MultipartBody {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct Writer {
    tx: mpsc::Sender<Result<Bytes>>,
    boundary: String,
}

impl Writer {
    /// Returns false if the body is incomplete.
    async fn write<B, M>(
        &self,
        body: B,
        body_type: Option<String>,
        media: M,
        media_type: Option<String>,
    ) -> bool
    where
        B: StreamingSource + Send,
        M: StreamingSource + Send,
    {
        let b = &self.boundary;
        self.send(Ok(part_header(b, body_type.as_deref(), true))).await
            && self.copy(body, "metadata").await
            && self.send(Ok(part_header(b, media_type.as_deref(), false))).await
            && self.copy(media, "media").await
            && self.send(Ok(Bytes::from(format!("\r\n--{b}--\r\n")))).await
    }

    /// Returns false if the consumer is gone.
    async fn send(&self, item: Result<Bytes>) -> bool {
        self.tx.send(item).await.is_ok()
    }

    async fn copy<S>(&self, mut source: S, part: &'static str) -> bool
    where
        S: StreamingSource + Send,
    {
        while let Some(next) = source.next().await {
            match next {
                Ok(b) if b.is_empty() => {}
                Ok(b) => {
                    if !self.send(Ok(b)).await {
                        return false;
                    }
                }
                Err(e) => {
                    let err = PartError {
                        part,
                        source: e.into(),
                    };
                    let _ = self.send(Err(Error::ser(err))).await;
                    return false;
                }
            }
        }
        true
    }
}

fn part_header(boundary: &str, content_type: Option<&str>, first: bool) -> Bytes {
    let separator = if first { "" } else { "\r\n" };
    let header = match content_type {
        Some(t) => format!("{separator}--{boundary}\r\nContent-Type: {t}\r\n\r\n"),
        None => format!("{separator}--{boundary}\r\n\r\n"),
    };
    Bytes::from(header)
}

fn new_boundary() -> String {
    hex::encode(rand::random::<[u8; 30]>())
}
