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

//! User agent and telemetry header helpers.

use http::HeaderValue;

pub(crate) const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the telemetry header.
pub const X_GOOG_API_CLIENT: &str = "x-goog-api-client";

/// Generated libraries create one static instance of this struct and use it
/// to build the `User-Agent` and `x-goog-api-client` header values.
#[derive(Debug, PartialEq)]
pub struct ApiClient {
    pub name: &'static str,
    pub version: &'static str,
}

impl ApiClient {
    /// Format the struct as needed for the `User-Agent` header.
    pub fn user_agent(&self) -> String {
        format!("{} {}/{}", default_user_agent(), self.name, self.version)
    }

    /// Format the struct as needed for the `x-goog-api-client` header.
    pub fn header_value(&self) -> HeaderValue {
        let value = format!("gl-rust gdcl/{PKG_VERSION} {}/{}", self.name, self.version);
        // Crate names and versions are always valid header values, fallback
        // to the bare library id otherwise.
        HeaderValue::from_str(&value)
            .unwrap_or_else(|_| HeaderValue::from_static(concat!("gdcl/", env!("CARGO_PKG_VERSION"))))
    }
}

/// The `User-Agent` sent when the application does not configure one.
pub fn default_user_agent() -> String {
    format!("google-api-rust-client/{PKG_VERSION}")
}
