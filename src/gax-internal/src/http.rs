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

use bytes::Bytes;
use gax::Result;
use gax::error::{ApiError, Error};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The maximum number of bytes captured from unsuccessful media responses.
pub const MAX_MEDIA_ERROR_BODY: usize = 1024 * 1024;

/// How to encode request bodies.
///
/// A few older APIs expect the request payload wrapped as `{"data": ...}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MarshalStyle {
    #[default]
    WithoutDataWrapper,
    WithDataWrapper,
}

/// Encodes `value` as a JSON request body.
pub fn json_body<T: Serialize>(value: &T, style: MarshalStyle) -> Result<Bytes> {
    #[derive(Serialize)]
    struct DataWrapper<'a, T> {
        data: &'a T,
    }

    let body = match style {
        MarshalStyle::WithoutDataWrapper => serde_json::to_vec(value),
        MarshalStyle::WithDataWrapper => serde_json::to_vec(&DataWrapper { data: value }),
    }
    .map_err(Error::ser)?;
    Ok(Bytes::from(body))
}

/// Maps errors sending a request, where there is no HTTP response.
pub fn map_send_error(err: reqwest::Error) -> Error {
    Error::io(err)
}

/// Returns the response unchanged if it is successful, an error otherwise.
///
/// The body of unsuccessful responses is decoded as a Google API error
/// envelope, when possible.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status_code = response.status().as_u16();
    let headers = response.headers().clone();
    let body = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("error reading the body of a {status_code} response: {e:?}");
            Bytes::new()
        }
    };
    Err(Error::service(ApiError::from_http(
        status_code,
        headers,
        &body,
    )))
}

/// Like [check_response], for media uploads and downloads.
///
/// The body of unsuccessful responses is not parsed, media endpoints may
/// return arbitrary payloads. At most [MAX_MEDIA_ERROR_BODY] bytes of the body
/// are captured.
pub async fn check_media_response(mut response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status_code = response.status().as_u16();
    let headers = response.headers().clone();
    let mut body = Vec::new();
    while body.len() < MAX_MEDIA_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let n = std::cmp::min(chunk.len(), MAX_MEDIA_ERROR_BODY - body.len());
                body.extend_from_slice(&chunk[..n]);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("error reading the body of a {status_code} response: {e:?}");
                break;
            }
        }
    }
    let body = String::from_utf8_lossy(&body).into_owned();
    Err(Error::service(ApiError::opaque(status_code, headers, body)))
}

/// Checks the response and decodes a successful response body.
pub async fn decode_response<O: DeserializeOwned + Default>(
    response: reqwest::Response,
) -> Result<O> {
    let response = check_response(response).await?;
    // 204 No Content has no body, parsing it with serde_json fails.
    let no_content = response.status() == reqwest::StatusCode::NO_CONTENT;
    let body = response.bytes().await.map_err(Error::io)?;
    if body.is_empty() && no_content {
        return Ok(O::default());
    }
    serde_json::from_slice::<O>(&body).map_err(Error::deser)
}
