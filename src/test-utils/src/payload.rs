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

//! Helper functions to generate upload payloads.

use bytes::Bytes;
use rand::RngCore;

/// Creates `n` random bytes.
///
/// The upload tests verify the service receives each byte exactly once, in
/// order. Random data makes any misplaced range visible.
///
/// # Example
/// ```
/// use google_api_test_utils::payload::random_payload;
/// let data = random_payload(1024);
/// assert_eq!(data.len(), 1024);
/// ```
pub fn random_payload(n: usize) -> Bytes {
    let mut data = vec![0_u8; n];
    rand::rng().fill_bytes(&mut data);
    Bytes::from(data)
}

/// Creates `n` bytes of printable text, cycling through the alphabet.
///
/// Useful when the content type detection must report `text/plain`.
pub fn text_payload(n: usize) -> Bytes {
    (0..n).map(|i| b'a' + (i % 26) as u8).collect::<Vec<u8>>().into()
}
