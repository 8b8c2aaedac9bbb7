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

//! Media sources.
//!
//! Uploads read the media through [StreamingSource]. Sources that can also
//! [Seek] and report an exact size are read one chunk at a time, directly
//! from the source. Any other source is buffered, one chunk at a time.

use bytes::Bytes;
use std::collections::VecDeque;
use std::path::Path;

/// The size of the media, in bytes, as reported by a [StreamingSource].
pub type SizeHint = http_body::SizeHint;

/// Wraps the media given to [MediaInfo][crate::MediaInfo].
///
/// Strings, byte buffers, vectors of buffers, files, and any
/// [StreamingSource] convert into a `Payload`.
///
/// # Example
/// ```
/// # use google_api_media::source::{BytesSource, Payload, StreamingSource};
/// # async fn sample() -> std::io::Result<()> {
/// let mut payload: Payload<BytesSource> = Payload::from(vec![b'x'; 1000]);
/// let hint = payload.size_hint().await?;
/// assert_eq!(hint.exact(), Some(1000));
/// let mut received = Vec::new();
/// while let Some(b) = payload.next().await.transpose()? {
///     received.extend_from_slice(&b);
/// }
/// assert_eq!(received.len(), 1000);
/// # Ok(()) }
/// ```
pub struct Payload<T> {
    payload: T,
}

impl<T> Payload<T>
where
    T: StreamingSource,
{
    pub fn from_stream(payload: T) -> Self {
        Self { payload }
    }
}

impl<T> StreamingSource for Payload<T>
where
    T: StreamingSource + Send + Sync,
{
    type Error = T::Error;

    async fn next(&mut self) -> Option<Result<Bytes, Self::Error>> {
        self.payload.next().await
    }

    async fn size_hint(&self) -> Result<SizeHint, Self::Error> {
        self.payload.size_hint().await
    }

    fn content_type(&self) -> Option<String> {
        self.payload.content_type()
    }
}

impl<T> Seek for Payload<T>
where
    T: Seek,
{
    type Error = T::Error;

    fn seek(&mut self, offset: u64) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.payload.seek(offset)
    }
}

impl From<Bytes> for Payload<BytesSource> {
    fn from(value: Bytes) -> Self {
        let payload = BytesSource::new(value);
        Self { payload }
    }
}

impl From<&'static str> for Payload<BytesSource> {
    fn from(value: &'static str) -> Self {
        let b = Bytes::from_static(value.as_bytes());
        Payload::from(b)
    }
}

impl From<Vec<u8>> for Payload<BytesSource> {
    fn from(value: Vec<u8>) -> Self {
        Payload::from(Bytes::from(value))
    }
}

impl From<Vec<Bytes>> for Payload<IterSource> {
    fn from(value: Vec<Bytes>) -> Self {
        let payload = IterSource::new(value);
        Self { payload }
    }
}

impl From<tokio::fs::File> for Payload<FileSource> {
    fn from(value: tokio::fs::File) -> Self {
        Self {
            payload: FileSource::new(value),
        }
    }
}

impl<S> From<S> for Payload<S>
where
    S: StreamingSource,
{
    fn from(value: S) -> Self {
        Self { payload: value }
    }
}

/// A source of media, read once from start to end.
pub trait StreamingSource {
    /// Errors reading the media. Uploads stop on the first error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the next buffer, or `None` at the end of the media.
    ///
    /// Empty buffers are allowed and ignored.
    fn next(&mut self) -> impl Future<Output = Option<Result<Bytes, Self::Error>>> + Send;

    /// The size of the media, if the source knows it.
    ///
    /// The default reports an unknown size. Seekable sources with an exact
    /// size are not buffered in memory.
    fn size_hint(&self) -> impl Future<Output = Result<SizeHint, Self::Error>> + Send {
        std::future::ready(Ok(SizeHint::new()))
    }

    /// The media type, for sources that know it.
    ///
    /// Sources returning `None` (the default) have their media type detected
    /// from the first bytes of the data.
    fn content_type(&self) -> Option<String> {
        None
    }
}

/// A [StreamingSource] that can restart at any offset.
pub trait Seek {
    /// Errors repositioning the source.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Moves the source to `offset`, the following `next()` starts there.
    ///
    /// Uploads seek to the start of each chunk, and to the offset persisted by
    /// the service when resending data. Reading the same offset twice must
    /// return the same bytes.
    fn seek(&mut self, offset: u64) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

const READ_SIZE: usize = 256 * 1024;

/// Reads the media from a file.
///
/// Files opened with [FileSource::open] report the media type matching
/// their extension. Files converted from a [tokio::fs::File] do not, their
/// media type is detected from the contents.
///
/// # Example
/// ```
/// # use google_api_media::source::FileSource;
/// # async fn sample() -> std::io::Result<()> {
/// let source = FileSource::open("report.pdf").await?;
/// # Ok(()) }
/// ```
pub struct FileSource {
    inner: tokio::fs::File,
    content_type: Option<String>,
}

impl FileSource {
    fn new(inner: tokio::fs::File) -> Self {
        Self {
            inner,
            content_type: None,
        }
    }

    /// Opens `path` for reading.
    pub async fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let inner = tokio::fs::File::open(path).await?;
        let content_type = mime_guess::from_path(path).first_raw().map(str::to_string);
        Ok(Self {
            inner,
            content_type,
        })
    }
}

impl StreamingSource for FileSource {
    type Error = std::io::Error;

    async fn next(&mut self) -> Option<Result<Bytes, Self::Error>> {
        let mut buffer = vec![0_u8; READ_SIZE];
        match tokio::io::AsyncReadExt::read(&mut self.inner, &mut buffer).await {
            Err(e) => Some(Err(e)),
            Ok(0) => None,
            Ok(n) => {
                buffer.truncate(n);
                Some(Ok(Bytes::from(buffer)))
            }
        }
    }

    async fn size_hint(&self) -> Result<SizeHint, Self::Error> {
        let m = self.inner.metadata().await?;
        Ok(SizeHint::with_exact(m.len()))
    }

    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }
}

impl Seek for FileSource {
    type Error = std::io::Error;

    async fn seek(&mut self, offset: u64) -> Result<(), Self::Error> {
        use tokio::io::AsyncSeekExt;
        let _ = self.inner.seek(std::io::SeekFrom::Start(offset)).await?;
        Ok(())
    }
}

/// Media already in memory.
pub struct BytesSource {
    contents: Bytes,
    current: Option<Bytes>,
}

impl BytesSource {
    pub fn new(contents: Bytes) -> Self {
        let current = Some(contents.clone());
        Self { contents, current }
    }
}

impl StreamingSource for BytesSource {
    type Error = std::io::Error;

    async fn next(&mut self) -> Option<Result<Bytes, Self::Error>> {
        self.current.take().filter(|b| !b.is_empty()).map(Ok)
    }

    async fn size_hint(&self) -> Result<SizeHint, Self::Error> {
        let s = self.contents.len() as u64;
        Ok(SizeHint::with_exact(s))
    }
}

impl Seek for BytesSource {
    type Error = std::io::Error;

    async fn seek(&mut self, offset: u64) -> Result<(), Self::Error> {
        let pos = std::cmp::min(offset as usize, self.contents.len());
        self.current = Some(self.contents.slice(pos..));
        Ok(())
    }
}

/// Media in memory, split in several buffers.
pub struct IterSource {
    contents: Vec<Bytes>,
    current: VecDeque<Bytes>,
}

impl IterSource {
    pub fn new<I>(iterator: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let contents: Vec<Bytes> = iterator.into_iter().collect();
        let current: VecDeque<Bytes> = contents.iter().cloned().collect();
        Self { contents, current }
    }
}

impl StreamingSource for IterSource {
    type Error = std::io::Error;

    async fn next(&mut self) -> Option<Result<Bytes, Self::Error>> {
        self.current.pop_front().map(Ok)
    }

    async fn size_hint(&self) -> Result<SizeHint, Self::Error> {
        let s = self.contents.iter().fold(0_u64, |a, i| a + i.len() as u64);
        Ok(SizeHint::with_exact(s))
    }
}

impl Seek for IterSource {
    type Error = std::io::Error;

    async fn seek(&mut self, offset: u64) -> Result<(), Self::Error> {
        let mut start = 0_u64;
        self.current = self
            .contents
            .iter()
            .filter_map(|b| {
                let skip = offset.saturating_sub(start);
                start += b.len() as u64;
                (skip < b.len() as u64).then(|| b.slice(skip as usize..))
            })
            .collect();
        Ok(())
    }
}

/// Adapts a [futures::Stream] of buffers.
///
/// The size is unknown and the stream cannot seek, uploads buffer one chunk
/// at a time.
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S, E> StreamingSource for StreamSource<S>
where
    S: futures::Stream<Item = Result<Bytes, E>> + Unpin + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    async fn next(&mut self) -> Option<Result<Bytes, Self::Error>> {
        futures::StreamExt::next(&mut self.inner).await
    }
}
