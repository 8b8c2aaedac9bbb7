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

//! Media uploads for Google API client libraries.
//!
//! Generated clients use this crate to send media (files, buffers, or any
//! stream of bytes) with a resource. Small media is sent in a single
//! `multipart/related` request. Larger media is sent in chunks, in a
//! resumable upload session that survives transient failures.
//!
//! # Example
//! ```
//! # use google_api_media::{MediaInfo, MediaOptions};
//! # use tokio_util::sync::CancellationToken;
//! # async fn sample(client: reqwest::Client, session_uri: String) -> gax::Result<()> {
//! let media = MediaInfo::buffered("hello world", MediaOptions::new()).await?;
//! let mut upload = media.resumable_upload(client, session_uri);
//! let response = upload.upload(&CancellationToken::new()).await?;
//! println!("status = {}", response.status());
//! # Ok(()) }
//! ```

pub mod chunker;
pub mod error;
pub mod media_info;
pub mod multipart;
pub mod options;
pub mod resumable;
pub mod sniffer;
pub mod source;

pub use media_info::MediaInfo;
pub use options::MediaOptions;
pub use resumable::{ProgressHandle, ResumableUpload, UploadState};
pub use source::{Payload, Seek, SizeHint, StreamingSource};
