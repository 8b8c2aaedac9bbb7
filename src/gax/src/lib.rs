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

//! Google APIs helpers.
//!
//! This crate contains the types and functions shared by the generated
//! Google API client libraries for Rust: the error type returned by all
//! clients, backoff policies, the paging iterator used by list calls, and the
//! helpers to request partial responses.

/// An alias of [std::result::Result] where the error is always [crate::error::Error].
///
/// This is the result type used by all functions wrapping API calls.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The core error types used by generated clients.
pub mod error;

/// Converts list calls into item-at-a-time or page-at-a-time iterators.
pub mod paginator;

pub mod backoff_policy;
pub mod exponential_backoff;
pub mod fields;

#[cfg(test)]
mod mock_rng;
