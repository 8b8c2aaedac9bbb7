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

//! Detects the media type of a source from its first bytes.

use crate::source::{SizeHint, StreamingSource};
use bytes::Bytes;
use std::collections::VecDeque;

/// The maximum number of bytes used to detect the media type.
pub const SNIFF_BUFFER_SIZE: usize = 512;

/// The media type reported when nothing more specific matches.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Wraps a [StreamingSource] to detect its media type.
///
/// The first call to [sniff()][ContentSniffer::sniff] reads up to
/// [SNIFF_BUFFER_SIZE] bytes from the source. Those bytes are returned again
/// by [next()][StreamingSource::next], before any other data from the
/// source. The bytes are returned exactly once, and in order.
///
/// If reading from the source fails while detecting the media type, the
/// media type is unknown, and the error is returned by `next()` once the
/// buffered data is exhausted.
///
/// # Example
/// ```
/// # use google_api_media::sniffer::ContentSniffer;
/// # use google_api_media::source::{BytesSource, StreamingSource};
/// # async fn sample() -> std::io::Result<()> {
/// let source = BytesSource::new(bytes::Bytes::from_static(b"%PDF-1.7 ..."));
/// let mut sniffer = ContentSniffer::new(source);
/// assert_eq!(sniffer.sniff().await, Some("application/pdf"));
/// while let Some(data) = sniffer.next().await.transpose()? {
///     println!("{data:?}");
/// }
/// # Ok(()) }
/// ```
pub struct ContentSniffer<S>
where
    S: StreamingSource,
{
    inner: S,
    buffered: VecDeque<Bytes>,
    error: Option<S::Error>,
    eof: bool,
    started: bool,
    sniffed: Option<Option<&'static str>>,
}

impl<S> ContentSniffer<S>
where
    S: StreamingSource,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffered: VecDeque::new(),
            error: None,
            eof: false,
            started: false,
            sniffed: None,
        }
    }

    /// Returns the detected media type.
    ///
    /// Returns `None` if the source fails while reading the first bytes, or
    /// if the application already started reading the data.
    pub async fn sniff(&mut self) -> Option<&'static str> {
        if let Some(s) = self.sniffed {
            return s;
        }
        if self.started {
            return None;
        }
        let mut prefix = Vec::with_capacity(SNIFF_BUFFER_SIZE);
        while prefix.len() < SNIFF_BUFFER_SIZE {
            match self.inner.next().await {
                None => {
                    // An empty source is not an error.
                    self.eof = true;
                    break;
                }
                Some(Ok(b)) => {
                    let n = std::cmp::min(b.len(), SNIFF_BUFFER_SIZE - prefix.len());
                    prefix.extend_from_slice(&b[..n]);
                    self.buffered.push_back(b);
                }
                Some(Err(e)) => {
                    tracing::debug!("cannot read the media to detect its type: {e:?}");
                    self.error = Some(e);
                    break;
                }
            }
        }
        let sniffed = match self.error {
            Some(_) => None,
            None => Some(detect_content_type(&prefix)),
        };
        self.sniffed = Some(sniffed);
        sniffed
    }
}

impl<S> StreamingSource for ContentSniffer<S>
where
    S: StreamingSource + Send + Sync,
{
    type Error = S::Error;

    async fn next(&mut self) -> Option<Result<Bytes, Self::Error>> {
        self.started = true;
        if let Some(b) = self.buffered.pop_front() {
            return Some(Ok(b));
        }
        if let Some(e) = self.error.take() {
            return Some(Err(e));
        }
        if self.eof {
            return None;
        }
        self.inner.next().await
    }

    async fn size_hint(&self) -> Result<SizeHint, Self::Error> {
        self.inner.size_hint().await
    }

    fn content_type(&self) -> Option<String> {
        self.inner.content_type()
    }
}

/// Detects the media type of `data`.
///
/// Uses the signatures in the [MIME Sniffing Standard], only the first
/// [SNIFF_BUFFER_SIZE] bytes are considered. Always returns a valid media
/// type, [OCTET_STREAM] if nothing more specific matches.
///
/// # Example
/// ```
/// # use google_api_media::sniffer::detect_content_type;
/// assert_eq!(detect_content_type(b"GIF89a..."), "image/gif");
/// assert_eq!(detect_content_type(b"hello world"), "text/plain; charset=utf-8");
/// ```
///
/// [MIME Sniffing Standard]: https://mimesniff.spec.whatwg.org/
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..std::cmp::min(data.len(), SNIFF_BUFFER_SIZE)];
    let first_non_ws = data
        .iter()
        .position(|b| !is_whitespace(*b))
        .unwrap_or(data.len());
    let trimmed = &data[first_non_ws..];

    if HTML_TAGS.iter().any(|tag| html_tag(trimmed, tag)) {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if let Some(m) = EXACT
        .iter()
        .find_map(|(sig, mime)| data.starts_with(sig).then_some(*mime))
    {
        return m;
    }
    if let Some(m) = riff(data) {
        return m;
    }
    if data.len() >= 12 && data.starts_with(b"FORM") && &data[8..12] == b"AIFF" {
        return "audio/aiff";
    }
    if mp4(data) {
        return "video/mp4";
    }
    if !data.iter().any(|b| is_binary(*b)) {
        return "text/plain; charset=utf-8";
    }
    OCTET_STREAM
}

const HTML_TAGS: [&[u8]; 17] = [
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

// Order matters, e.g. the byte order marks are checked before `text/plain`.
const EXACT: [(&[u8], &str); 26] = [
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", "text/plain; charset=utf-8"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"\x00\x01\x00\x00", "font/ttf"),
    (b"OTTO", "font/otf"),
    (b"ttcf", "font/collection"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Matches an HTML tag, case insensitive, followed by a space or `>`.
fn html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    let (head, rest) = data.split_at(tag.len());
    head.eq_ignore_ascii_case(tag) && matches!(rest[0], b' ' | b'>')
}

fn riff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || !data.starts_with(b"RIFF") {
        return None;
    }
    match &data[8..12] {
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        b"WEBP" if data.len() >= 14 && &data[12..14] == b"VP" => Some("image/webp"),
        _ => None,
    }
}

fn mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    // The brands start at offset 8, skipping the minor version at offset 12.
    (8..box_size)
        .step_by(4)
        .filter(|st| *st != 12)
        .any(|st| data.len() >= st + 3 && &data[st..st + 3] == b"mp4")
}
