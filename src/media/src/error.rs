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

//! Errors specific to media uploads.
//!
//! The upload functions return [gax::error::Error]. The types in this module
//! are the [source][std::error::Error::source] of those errors, when the
//! problem is specific to uploads.

/// An unrecoverable problem in the upload protocol.
///
/// Most of these errors indicate a bug in the resumable upload protocol
/// implementation, either in the service or the client library. Neither are
/// expected to be common, but neither are impossible. There is little an
/// application can do to recover from these problems, other than starting a
/// new upload.
///
/// While it is customary to `panic!()` when a bug triggers a problem, we do not
/// believe it is appropriate to do so in this case, as the invariants involve
/// different machines and the upload protocol.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum UploadError {
    /// The service reports fewer bytes persisted than the data still buffered
    /// by the client library.
    ///
    /// Forward-only sources keep only the current chunk in memory. If the
    /// service asks for data before that chunk the upload cannot continue.
    #[error(
        "the service requested data starting at {persisted}, but the source can only resume at {offset}"
    )]
    UnexpectedRewind { offset: u64, persisted: u64 },

    /// The service reports more bytes persisted than sent.
    ///
    /// # Troubleshoot
    ///
    /// Most likely this indicates that two concurrent uploads are using the
    /// same session. Review your application design to avoid concurrent
    /// uploads.
    #[error("the service reports {persisted} bytes as persisted, but we only sent {sent} bytes")]
    TooMuchProgress { sent: u64, persisted: u64 },

    /// The application called `upload()` on a session that already finished.
    #[error("the upload session is {0}, it cannot be used again")]
    Terminated(&'static str),
}
