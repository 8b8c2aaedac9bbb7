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

use tracing_subscriber::EnvFilter;

/// Enables tracing for the current thread.
///
/// Tests call this to see the protocol steps of uploads and paginators. The
/// `RUST_LOG` environment variable overrides the default level.
pub fn enable_tracing() -> ::tracing::subscriber::DefaultGuard {
    #[cfg(feature = "log-integration-tests")]
    let default_level = "debug";
    #[cfg(not(feature = "log-integration-tests"))]
    let default_level = "warn";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_thread_ids(true)
        .with_env_filter(filter)
        .with_test_writer()
        .finish();

    tracing::subscriber::set_default(subscriber)
}
