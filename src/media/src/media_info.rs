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

use crate::chunker::{BufferedChunker, Chunker, SizedChunker};
use crate::multipart::{MultipartBody, combine_body_media};
use crate::options::MediaOptions;
use crate::resumable::ResumableUpload;
use crate::sniffer::{ContentSniffer, OCTET_STREAM, detect_content_type};
use crate::source::{Payload, Seek, StreamingSource};
use bytes::Bytes;
use gax::Result;
use gax::error::Error;
use http::{HeaderMap, HeaderValue};

/// The header declaring the media type in requests starting a resumable
/// upload.
pub const X_UPLOAD_CONTENT_TYPE: &str = "x-upload-content-type";

/// The media for an upload, and how to send it.
///
/// Creating a `MediaInfo` reads the first chunk of the media. That
/// determines the media type (unless it is configured explicitly), and
/// whether the media fits in a single request.
///
/// # Example
/// ```
/// # use google_api_media::media_info::MediaInfo;
/// # use google_api_media::options::MediaOptions;
/// # async fn sample() -> gax::Result<()> {
/// let media = MediaInfo::buffered("hello world", MediaOptions::new()).await?;
/// assert_eq!(media.media_type(), Some("text/plain; charset=utf-8"));
/// assert_eq!(media.upload_type(), "multipart");
/// # Ok(()) }
/// ```
pub struct MediaInfo {
    chunker: Box<dyn Chunker>,
    media_type: Option<String>,
    single_request: bool,
    options: MediaOptions,
}

enum MediaType {
    Empty,
    Known(String),
    Detect,
}

impl MediaType {
    fn new<S: StreamingSource>(options: &MediaOptions, source: &S) -> Self {
        if options.force_empty_content_type {
            return Self::Empty;
        }
        if let Some(t) = &options.content_type {
            return Self::Known(t.clone());
        }
        match source.content_type() {
            Some(t) => Self::Known(t),
            None => Self::Detect,
        }
    }
}

impl MediaInfo {
    /// Prepares an upload for any source.
    ///
    /// The media is uploaded in chunks, each chunk is buffered in memory.
    pub async fn buffered<T, S>(payload: T, options: MediaOptions) -> Result<Self>
    where
        T: Into<Payload<S>>,
        S: StreamingSource + Send + Sync + 'static,
    {
        let payload = payload.into();
        let chunk_size = options.buffer_size();
        let (media_type, chunker): (Option<String>, Box<dyn Chunker>) =
            match MediaType::new(&options, &payload) {
                MediaType::Empty => (None, Box::new(BufferedChunker::new(payload, chunk_size))),
                MediaType::Known(t) => {
                    (Some(t), Box::new(BufferedChunker::new(payload, chunk_size)))
                }
                MediaType::Detect => {
                    let mut sniffer = ContentSniffer::new(payload);
                    // Reading the first chunk reports any errors.
                    let detected = sniffer.sniff().await.unwrap_or(OCTET_STREAM);
                    (
                        Some(detected.to_string()),
                        Box::new(BufferedChunker::new(sniffer, chunk_size)),
                    )
                }
            };
        Self::new(chunker, media_type, options).await
    }

    /// Prepares an upload for sources with a known size.
    ///
    /// Each chunk is read from the source when needed, using [Seek] to
    /// resend data. Sources without an exact size hint are buffered, as in
    /// [MediaInfo::buffered].
    pub async fn unbuffered<T, S>(payload: T, options: MediaOptions) -> Result<Self>
    where
        T: Into<Payload<S>>,
        S: StreamingSource + Seek + Send + Sync + 'static,
    {
        let payload = payload.into();
        let hint = payload.size_hint().await.map_err(Error::ser)?;
        let Some(size) = hint.exact() else {
            tracing::debug!("the media size is unknown, buffering each chunk");
            return Self::buffered::<Payload<S>, S>(payload, options).await;
        };
        let media_type = MediaType::new(&options, &payload);
        let chunk_size = options.buffer_size() as u64;
        let mut chunker = SizedChunker::new(payload, size, chunk_size);
        let first = chunker.chunk_at(0).await?;
        let media_type = match media_type {
            MediaType::Empty => None,
            MediaType::Known(t) => Some(t),
            MediaType::Detect => Some(detect_content_type(first.data()).to_string()),
        };
        Ok(Self {
            chunker: Box::new(chunker),
            media_type,
            single_request: first.is_final(),
            options,
        })
    }

    async fn new(
        mut chunker: Box<dyn Chunker>,
        media_type: Option<String>,
        options: MediaOptions,
    ) -> Result<Self> {
        let first = chunker.chunk_at(0).await?;
        Ok(Self {
            chunker,
            media_type,
            single_request: first.is_final(),
            options,
        })
    }

    /// The media type, `None` if the upload sends no content type.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// The value for the `uploadType` query parameter.
    ///
    /// Media that fits in a single chunk uses a simple (`multipart`) upload,
    /// larger media uses a `resumable` upload.
    pub fn upload_type(&self) -> &'static str {
        if self.single_request {
            "multipart"
        } else {
            "resumable"
        }
    }

    /// Headers for the request starting a resumable upload.
    pub fn upload_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(t) = self.media_type.as_deref() {
            match HeaderValue::from_str(t) {
                Ok(v) => {
                    headers.insert(X_UPLOAD_CONTENT_TYPE, v);
                }
                Err(e) => tracing::warn!("invalid media type {t:?}: {e}"),
            }
        }
        headers
    }

    /// Composes a simple upload body, with the resource metadata in `body`.
    ///
    /// Returns the body and its content type.
    pub fn into_multipart<T, S>(self, body: T, body_type: &str) -> (MultipartBody, String)
    where
        T: Into<Payload<S>>,
        S: StreamingSource + Send + Sync + 'static,
    {
        let body: Payload<S> = body.into();
        let media = ChunkSource {
            chunker: self.chunker,
            offset: 0,
            done: false,
        };
        combine_body_media(
            body,
            Some(body_type),
            media,
            self.media_type.as_deref(),
        )
    }

    /// Sends the media to a resumable upload session.
    ///
    /// `uri` is the value of the `Location` header in the response starting
    /// the session.
    pub fn resumable_upload<U: Into<String>>(
        self,
        client: reqwest::Client,
        uri: U,
    ) -> ResumableUpload {
        ResumableUpload::new(
            client,
            uri.into(),
            self.media_type,
            self.chunker,
            self.options,
        )
    }

    /// Continues sending the media to an existing session.
    ///
    /// Use this function to resume an upload started by a different process,
    /// or a different `ResumableUpload`. The upload queries the service for
    /// the persisted size before sending any data.
    pub fn resume_upload<U: Into<String>>(self, client: reqwest::Client, uri: U) -> ResumableUpload {
        self.resumable_upload(client, uri).with_probe()
    }
}

impl std::fmt::Debug for MediaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaInfo")
            .field("media_type", &self.media_type)
            .field("upload_type", &self.upload_type())
            .field("options", &self.options)
            .finish()
    }
}

/// Reads the chunks in order, as a single stream.
struct ChunkSource {
    chunker: Box<dyn Chunker>,
    offset: u64,
    done: bool,
}

impl StreamingSource for ChunkSource {
    type Error = Error;

    async fn next(&mut self) -> Option<std::result::Result<Bytes, Self::Error>> {
        if self.done {
            return None;
        }
        match self.chunker.chunk_at(self.offset).await {
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
            Ok(chunk) => {
                self.offset = chunk.end();
                self.done = chunk.is_final();
                Some(Ok(chunk.data().clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::MIN_UPLOAD_CHUNK_SIZE;
    use crate::source::tests::MockSimpleSource;
    use crate::source::{BytesSource, FileSource};
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    const PNG: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A rest of the image";

    fn large(size: usize) -> Bytes {
        Bytes::from(vec![b'a'; size])
    }

    #[tokio::test]
    async fn buffered_detect() -> TestResult {
        let media = MediaInfo::buffered(Bytes::from_static(PNG), MediaOptions::new()).await?;
        assert_eq!(media.media_type(), Some("image/png"));
        assert_eq!(media.upload_type(), "multipart");
        Ok(())
    }

    #[tokio::test]
    async fn buffered_empty() -> TestResult {
        let media = MediaInfo::buffered(Bytes::new(), MediaOptions::new()).await?;
        assert_eq!(media.media_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(media.upload_type(), "multipart");
        Ok(())
    }

    #[test_case(MediaOptions::new().with_content_type("image/jpeg"), Some("image/jpeg"); "explicit")]
    #[test_case(MediaOptions::new().with_force_empty_content_type(true), None; "force empty")]
    #[test_case(MediaOptions::new().with_content_type("image/jpeg").with_force_empty_content_type(true), None; "force empty wins")]
    #[tokio::test]
    async fn explicit_type(options: MediaOptions, want: Option<&str>) -> TestResult {
        let media = MediaInfo::buffered(Bytes::from_static(PNG), options.clone()).await?;
        assert_eq!(media.media_type(), want);
        let media = MediaInfo::unbuffered(Bytes::from_static(PNG), options).await?;
        assert_eq!(media.media_type(), want);
        Ok(())
    }

    #[tokio::test]
    async fn self_describing_source() -> TestResult {
        let mut source = MockSimpleSource::new();
        source
            .expect_content_type()
            .return_const(Some("application/x-test-only".to_string()));
        let mut pieces = vec![Bytes::from_static(PNG)].into_iter();
        source.expect_next().returning(move || pieces.next().map(Ok));
        let media = MediaInfo::buffered(source, MediaOptions::new()).await?;
        assert_eq!(media.media_type(), Some("application/x-test-only"));
        Ok(())
    }

    #[tokio::test]
    async fn file_source() -> TestResult {
        let mut file = tempfile::Builder::new().suffix(".html").tempfile()?;
        file.write_all(b"not really html")?;
        file.flush()?;
        let source = FileSource::open(file.path()).await?;
        let media = MediaInfo::unbuffered(source, MediaOptions::new()).await?;
        assert_eq!(media.media_type(), Some("text/html"));
        Ok(())
    }

    #[tokio::test]
    async fn unbuffered_detect_from_file() -> TestResult {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"%PDF-1.4 and more")?;
        file.flush()?;
        let source = tokio::fs::File::open(file.path()).await?;
        let media = MediaInfo::unbuffered(source, MediaOptions::new()).await?;
        assert_eq!(media.media_type(), Some("application/pdf"));
        Ok(())
    }

    #[test_case(MIN_UPLOAD_CHUNK_SIZE as usize, "multipart")]
    #[test_case(MIN_UPLOAD_CHUNK_SIZE as usize + 1, "resumable")]
    #[tokio::test]
    async fn upload_type(size: usize, want: &str) -> TestResult {
        let options = MediaOptions::new().with_chunk_size(MIN_UPLOAD_CHUNK_SIZE);
        let media = MediaInfo::buffered(large(size), options.clone()).await?;
        assert_eq!(media.upload_type(), want);
        let media = MediaInfo::unbuffered(large(size), options).await?;
        assert_eq!(media.upload_type(), want);
        Ok(())
    }

    /// A source that can seek, but does not know its size.
    struct UnknownSize(BytesSource);

    impl StreamingSource for UnknownSize {
        type Error = std::io::Error;

        async fn next(&mut self) -> Option<std::result::Result<Bytes, Self::Error>> {
            self.0.next().await
        }
    }

    impl Seek for UnknownSize {
        type Error = std::io::Error;

        async fn seek(&mut self, offset: u64) -> std::result::Result<(), Self::Error> {
            self.0.seek(offset).await
        }
    }

    #[tokio::test]
    async fn unbuffered_without_size() -> TestResult {
        let source = UnknownSize(BytesSource::new(Bytes::from_static(b"<html>")));
        let media = MediaInfo::unbuffered(source, MediaOptions::new()).await?;
        assert_eq!(media.media_type(), Some("text/html; charset=utf-8"));
        assert_eq!(media.upload_type(), "multipart");
        Ok(())
    }

    #[tokio::test]
    async fn first_chunk_error() -> TestResult {
        let mut source = MockSimpleSource::new();
        source.expect_content_type().return_const(None);
        source.expect_next().once().returning(|| {
            Some(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "test-only",
            )))
        });
        let err = MediaInfo::buffered(source, MediaOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_serialization(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn upload_headers() -> TestResult {
        let media = MediaInfo::buffered(Bytes::from_static(PNG), MediaOptions::new()).await?;
        let headers = media.upload_headers();
        assert_eq!(
            headers.get(X_UPLOAD_CONTENT_TYPE),
            Some(&HeaderValue::from_static("image/png"))
        );

        let options = MediaOptions::new().with_force_empty_content_type(true);
        let media = MediaInfo::buffered(Bytes::from_static(PNG), options).await?;
        assert!(media.upload_headers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn into_multipart() -> TestResult {
        let options = MediaOptions::new().with_chunk_size(MIN_UPLOAD_CHUNK_SIZE);
        let data = large(MIN_UPLOAD_CHUNK_SIZE as usize * 2 + 10);
        let media = MediaInfo::buffered(data.clone(), options).await?;
        let (mut body, content_type) = media.into_multipart(
            BytesSource::new(Bytes::from_static(b"{}")),
            "application/json",
        );
        let boundary = content_type
            .strip_prefix("multipart/related; boundary=")
            .unwrap_or_default()
            .to_string();
        let mut got = Vec::new();
        while let Some(b) = body.next().await.transpose()? {
            got.extend_from_slice(&b);
        }
        let mut want = Vec::new();
        want.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json\r\n\r\n{{}}\r\n--{boundary}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n"
            )
            .as_bytes(),
        );
        want.extend_from_slice(&data);
        want.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        assert!(got == want, "got {} bytes, want {}", got.len(), want.len());
        Ok(())
    }
}
