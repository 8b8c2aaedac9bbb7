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

//! Helpers to request [partial responses].
//!
//! Most Google APIs accept a `fields` query parameter selecting which fields
//! to include in the response. The client libraries forward the selector
//! without interpreting it.
//!
//! # Example
//! ```
//! # use google_api_gax::fields::{Field, combine_fields};
//! let fields = combine_fields([Field::from("items(id,name)"), Field::from("nextPageToken")]);
//! assert_eq!(fields, "items(id,name),nextPageToken");
//! ```
//!
//! [partial responses]: https://developers.google.com/discovery/v1/performance#partial-response

/// A partial-response selector, e.g. `items(id,name)` or `nextPageToken`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Field(String);

impl Field {
    /// The selector as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Joins the selectors into the value of the `fields` query parameter.
pub fn combine_fields<I>(fields: I) -> String
where
    I: IntoIterator<Item = Field>,
{
    fields
        .into_iter()
        .map(|f| f.0)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
