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

//! Splits the media into chunks for resumable uploads.
//!
//! There are two strategies. A [SizedChunker] reads each chunk on demand from
//! a source with a known size that supports [Seek]. A [BufferedChunker]
//! keeps one chunk in memory, it works with any source.

use crate::error::UploadError;
use crate::source::{Seek, StreamingSource};
use bytes::{Bytes, BytesMut};
use gax::Result;
use gax::error::Error;

/// Resumable upload chunks (except for the last chunk) *must* be sized to a
/// multiple of 256 KiB.
pub const MIN_UPLOAD_CHUNK_SIZE: i64 = 256 * 1024;

/// The chunk size used when the application does not configure one.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: i64 = 16 * 1024 * 1024;

/// Rounds `size` up to a multiple of [MIN_UPLOAD_CHUNK_SIZE].
///
/// Values less than or equal to zero are returned unchanged, they mean "use
/// the default" to the functions consuming them.
///
/// # Example
/// ```
/// # use google_api_media::chunker::round_chunk_size;
/// assert_eq!(round_chunk_size(0), 0);
/// assert_eq!(round_chunk_size(1), 256 * 1024);
/// assert_eq!(round_chunk_size(256 * 1024), 256 * 1024);
/// ```
pub fn round_chunk_size(size: i64) -> i64 {
    if size <= 0 {
        return size;
    }
    match size % MIN_UPLOAD_CHUNK_SIZE {
        0 => size,
        rem => size
            .checked_add(MIN_UPLOAD_CHUNK_SIZE - rem)
            .unwrap_or(size - rem),
    }
}

/// A contiguous range of the media, sent in a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    offset: u64,
    data: Bytes,
    is_final: bool,
}

impl Chunk {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if this chunk completes the media.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// The offset of the first byte after this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.len()
    }

    /// The value for the `Content-Range` header.
    ///
    /// The total size is only included in the final chunk.
    pub fn content_range(&self) -> String {
        let o = self.offset;
        match (self.len(), self.is_final) {
            (0, _) => format!("bytes */{o}"),
            (n, true) => format!("bytes {o}-{}/{}", o + n - 1, o + n),
            (n, false) => format!("bytes {o}-{}/*", o + n - 1),
        }
    }

    fn slice_from(&self, offset: u64) -> Chunk {
        let start = (offset - self.offset) as usize;
        Chunk {
            offset,
            data: self.data.slice(start..),
            is_final: self.is_final,
        }
    }
}

/// Produces the chunks of a resumable upload.
#[async_trait::async_trait]
pub trait Chunker: Send + Sync {
    /// Returns the chunk starting at `offset`.
    ///
    /// Offsets are usually increasing, the service may ask to resend part of
    /// the last chunk.
    async fn chunk_at(&mut self, offset: u64) -> Result<Chunk>;

    /// The size of the media, if known.
    fn size(&self) -> Option<u64>;
}

/// Reads chunks from a source with a known size.
///
/// Only the current chunk is kept in memory. Each chunk is read after
/// seeking to its offset, so the service can request any range.
pub struct SizedChunker<S> {
    reader: Reader<S>,
    size: u64,
    chunk_size: u64,
    last: Option<Chunk>,
}

impl<S> SizedChunker<S> {
    /// Creates a new chunker for a source with `size` bytes.
    ///
    /// A `chunk_size` of zero sends the full media in a single chunk.
    pub fn new(source: S, size: u64, chunk_size: u64) -> Self {
        let chunk_size = match chunk_size {
            0 => size,
            n => n,
        };
        Self {
            reader: Reader::new(source),
            size,
            chunk_size,
            last: None,
        }
    }
}

#[async_trait::async_trait]
impl<S> Chunker for SizedChunker<S>
where
    S: StreamingSource + Seek + Send + Sync,
{
    async fn chunk_at(&mut self, offset: u64) -> Result<Chunk> {
        if let Some(c) = self.last.as_ref().filter(|c| c.offset == offset) {
            return Ok(c.clone());
        }
        if offset > self.size {
            return Err(Error::ser(UploadError::TooMuchProgress {
                sent: self.size,
                persisted: offset,
            }));
        }
        if !self.reader.started || self.reader.position != offset {
            self.reader.source.seek(offset).await.map_err(Error::ser)?;
            self.reader.reset(offset);
        }
        let want = std::cmp::min(self.chunk_size, self.size - offset) as usize;
        let data = self.reader.read(want).await?;
        let end = offset + data.len() as u64;
        if data.len() < want {
            tracing::warn!(
                "the media has {end} bytes, but the source reported {} bytes",
                self.size
            );
        }
        let chunk = Chunk {
            offset,
            data,
            is_final: end >= self.size || self.reader.eof,
        };
        self.last = Some(chunk.clone());
        Ok(chunk)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// Reads chunks from any source, keeping the current chunk in memory.
///
/// The end of the media is only known after reading past it. This chunker
/// reads one extra buffer after each chunk to detect the final chunk.
///
/// The service may request any range within the current chunk, or skip
/// forward. Requests for data before the current chunk fail.
pub struct BufferedChunker<S> {
    reader: Reader<S>,
    chunk_size: usize,
    current: Option<Chunk>,
}

impl<S> BufferedChunker<S> {
    /// Creates a new chunker, `chunk_size` must be positive.
    pub fn new(source: S, chunk_size: usize) -> Self {
        let mut reader = Reader::new(source);
        reader.started = true;
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            current: None,
        }
    }
}

#[async_trait::async_trait]
impl<S> Chunker for BufferedChunker<S>
where
    S: StreamingSource + Send + Sync,
{
    async fn chunk_at(&mut self, offset: u64) -> Result<Chunk> {
        let start = self
            .current
            .as_ref()
            .map(|c| c.offset)
            .unwrap_or(self.reader.position);
        if offset < start {
            return Err(Error::ser(UploadError::UnexpectedRewind {
                offset: start,
                persisted: offset,
            }));
        }
        if let Some(c) = self.current.as_ref() {
            if offset < c.end() || (c.is_empty() && offset == c.offset) {
                return Ok(c.slice_from(offset));
            }
        }
        if offset > self.reader.position {
            let sent = self.reader.position;
            let skipped = self.reader.skip(offset - sent).await?;
            if skipped < offset - sent {
                return Err(Error::ser(UploadError::TooMuchProgress {
                    sent: sent + skipped,
                    persisted: offset,
                }));
            }
        }
        let data = self.reader.read(self.chunk_size).await?;
        let is_final = data.len() < self.chunk_size || self.reader.at_end().await;
        let chunk = Chunk {
            offset,
            data,
            is_final,
        };
        self.current = Some(chunk.clone());
        Ok(chunk)
    }

    /// Known once the final chunk is read.
    fn size(&self) -> Option<u64> {
        self.current
            .as_ref()
            .filter(|c| c.is_final())
            .map(Chunk::end)
    }
}

/// Reads buffers from a source, tracking the position and any excess data.
struct Reader<S> {
    source: S,
    /// The offset of the next byte returned by `read()` or `skip()`.
    position: u64,
    /// Data received from the source but not returned yet.
    pending: Option<Bytes>,
    eof: bool,
    /// An error found while reading ahead, returned by the next read.
    error: Option<Error>,
    started: bool,
}

impl<S> Reader<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            position: 0,
            pending: None,
            eof: false,
            error: None,
            started: false,
        }
    }

    fn reset(&mut self, position: u64) {
        self.position = position;
        self.pending = None;
        self.eof = false;
        self.error = None;
        self.started = true;
    }
}

impl<S> Reader<S>
where
    S: StreamingSource + Send,
{
    async fn next_piece(&mut self) -> Result<Option<Bytes>> {
        if let Some(b) = self.pending.take() {
            return Ok(Some(b));
        }
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        while !self.eof {
            match self.source.next().await.transpose() {
                Ok(Some(b)) if b.is_empty() => continue,
                Ok(Some(b)) => return Ok(Some(b)),
                Ok(None) => self.eof = true,
                Err(e) => return Err(Error::ser(e)),
            }
        }
        Ok(None)
    }

    /// Reads up to `want` bytes, fewer only if the source is exhausted.
    async fn read(&mut self, want: usize) -> Result<Bytes> {
        let mut pieces = Vec::new();
        let mut size = 0;
        while size < want {
            let Some(mut b) = self.next_piece().await? else {
                break;
            };
            if size + b.len() > want {
                self.pending = Some(b.split_off(want - size));
            }
            size += b.len();
            pieces.push(b);
        }
        self.position += size as u64;
        Ok(concat(pieces, size))
    }

    /// Discards up to `n` bytes, returns the number of bytes discarded.
    async fn skip(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            let Some(b) = self.next_piece().await? else {
                break;
            };
            let take = std::cmp::min(b.len() as u64, n - skipped) as usize;
            if take < b.len() {
                self.pending = Some(b.slice(take..));
            }
            skipped += take as u64;
        }
        self.position += skipped;
        Ok(skipped)
    }

    /// Returns true if the source has no more data.
    async fn at_end(&mut self) -> bool {
        if self.pending.is_some() || self.error.is_some() {
            return false;
        }
        match self.next_piece().await {
            Ok(Some(b)) => {
                self.pending = Some(b);
                false
            }
            Ok(None) => true,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }
}

fn concat(mut pieces: Vec<Bytes>, size: usize) -> Bytes {
    if pieces.len() <= 1 {
        return pieces.pop().unwrap_or_default();
    }
    let mut buffer = BytesMut::with_capacity(size);
    for p in pieces {
        buffer.extend_from_slice(&p);
    }
    buffer.freeze()
}
