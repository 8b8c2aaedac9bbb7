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

//! Verify resumable uploads against a local HTTP server.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use gax::exponential_backoff::ExponentialBackoffBuilder;
    use google_api_media::chunker::MIN_UPLOAD_CHUNK_SIZE;
    use google_api_media::options::Sleep;
    use google_api_media::source::FileSource;
    use google_api_media::{MediaInfo, MediaOptions, UploadState};
    use google_api_test_utils::payload::{random_payload, text_payload};
    use google_api_test_utils::tracing::enable_tracing;
    use httptest::{Expectation, Server, cycle, matchers::*, responders::*};
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    type Result = anyhow::Result<()>;

    const SESSION: &str = "/upload/drive/v3/files";
    const MIB: usize = 1024 * 1024;
    const QUANTUM: usize = MIN_UPLOAD_CHUNK_SIZE as usize;

    #[derive(Clone, Debug, Default)]
    struct RecordingSleep(Arc<Mutex<Vec<Duration>>>);

    impl Sleep for RecordingSleep {
        fn sleep(&self, duration: Duration) -> futures::future::BoxFuture<'static, ()> {
            self.0.lock().unwrap().push(duration);
            Box::pin(std::future::ready(()))
        }
    }

    fn progress_recorder() -> (Arc<Mutex<Vec<u64>>>, impl Fn(u64) + Send + Sync + 'static) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let capture = received.clone();
        (received, move |n| capture.lock().unwrap().push(n))
    }

    fn expect_chunk(server: &Server, range: &'static str, responder: impl Responder + 'static) {
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", range))),
            ])
            .respond_with(responder),
        );
    }

    fn incomplete(last_byte: usize) -> ResponseBuilder<&'static str> {
        status_code(308).insert_header("range", format!("bytes=0-{last_byte}"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn chunked_buffered() -> Result {
        let _guard = enable_tracing();
        let server = Server::run();
        expect_chunk(&server, "bytes 0-8388607/*", incomplete(8 * MIB - 1));
        expect_chunk(&server, "bytes 8388608-16777215/*", incomplete(16 * MIB - 1));
        expect_chunk(
            &server,
            "bytes 16777216-20971519/20971520",
            status_code(200).body(json!({"name": "object", "size": "20971520"}).to_string()),
        );

        let data = random_payload(20 * MIB);
        let pieces = (0..data.len())
            .step_by(MIB)
            .map(|o| data.slice(o..o + MIB))
            .collect::<Vec<Bytes>>();
        let (received, callback) = progress_recorder();
        let options = MediaOptions::new()
            .with_content_type("application/octet-stream")
            .with_chunk_size(8 * MIB as i64)
            .with_progress(callback);
        let media = MediaInfo::buffered(pieces, options).await?;
        assert_eq!(media.upload_type(), "resumable");

        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let response = upload.upload(&CancellationToken::new()).await?;
        let object = response.json::<serde_json::Value>().await?;
        assert_eq!(object, json!({"name": "object", "size": "20971520"}));
        assert_eq!(upload.state(), UploadState::Completed);
        assert_eq!(
            *received.lock().unwrap(),
            vec![8_388_608, 16_777_216, 20_971_520]
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn chunked_file() -> Result {
        let server = Server::run();
        let data = random_payload(2 * QUANTUM + 100);
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&data)?;
        file.flush()?;

        expect_chunk(&server, "bytes 0-262143/*", incomplete(QUANTUM - 1));
        expect_chunk(&server, "bytes 262144-524287/*", incomplete(2 * QUANTUM - 1));
        expect_chunk(&server, "bytes 524288-524387/524388", status_code(201));

        let options = MediaOptions::new().with_chunk_size(QUANTUM as i64);
        let source = FileSource::open(file.path()).await?;
        let media = MediaInfo::unbuffered(source, options).await?;
        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let handle = upload.progress_handle();
        let response = upload.upload(&CancellationToken::new()).await?;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        assert_eq!(handle.get(), data.len() as u64);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resume_after_restart() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes */*"))),
            ])
            .respond_with(incomplete(QUANTUM - 1)),
        );
        expect_chunk(&server, "bytes 262144-524287/*", incomplete(2 * QUANTUM - 1));
        expect_chunk(&server, "bytes 524288-786431/786432", status_code(200));

        let data = random_payload(3 * QUANTUM);
        let (received, callback) = progress_recorder();
        let options = MediaOptions::new()
            .with_chunk_size(QUANTUM as i64)
            .with_progress(callback);
        let media = MediaInfo::unbuffered(data, options).await?;
        let mut upload = media.resume_upload(reqwest::Client::new(), server.url_str(SESSION));
        let _ = upload.upload(&CancellationToken::new()).await?;
        assert_eq!(*received.lock().unwrap(), vec![262_144, 524_288, 786_432]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn progress_reported_once() -> Result {
        let server = Server::run();
        expect_chunk(&server, "bytes 0-262143/*", incomplete(QUANTUM - 1));
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes 262144-524287/*"))),
            ])
            .times(2)
            .respond_with(cycle![
                incomplete(QUANTUM - 1),
                incomplete(2 * QUANTUM - 1),
            ]),
        );
        expect_chunk(&server, "bytes 524288-524288/524289", status_code(200));

        let (received, callback) = progress_recorder();
        let options = MediaOptions::new()
            .with_chunk_size(QUANTUM as i64)
            .with_progress(callback);
        let media = MediaInfo::unbuffered(random_payload(2 * QUANTUM + 1), options).await?;
        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let _ = upload.upload(&CancellationToken::new()).await?;
        assert_eq!(*received.lock().unwrap(), vec![262_144, 524_288, 524_289]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transient_errors() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes 0-9/10"))),
            ])
            .times(3)
            .respond_with(cycle![
                status_code(503),
                status_code(429),
                status_code(200).body("done"),
            ]),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes */*"))),
            ])
            .times(2)
            .respond_with(status_code(308)),
        );

        let sleep = RecordingSleep::default();
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_maximum_delay(Duration::from_secs(1))
            .build()?;
        let options = MediaOptions::new()
            .with_backoff_policy(backoff)
            .with_sleep(sleep.clone());
        let media = MediaInfo::buffered("0123456789", options).await?;
        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let response = upload.upload(&CancellationToken::new()).await?;
        assert_eq!(response.text().await?, "done");

        let delays = sleep.0.lock().unwrap().clone();
        assert_eq!(delays.len(), 2, "{delays:?}");
        assert!(delays[0] <= Duration::from_millis(100), "{delays:?}");
        assert!(delays[1] <= Duration::from_millis(200), "{delays:?}");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_between_chunks() -> Result {
        let server = Server::run();
        expect_chunk(&server, "bytes 0-262143/*", incomplete(QUANTUM - 1));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let options = MediaOptions::new()
            .with_chunk_size(QUANTUM as i64)
            .with_progress(move |_| trigger.cancel());
        let media = MediaInfo::buffered(random_payload(2 * QUANTUM), options).await?;
        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let err = upload.upload(&cancel).await.unwrap_err();
        assert!(err.is_cancelled(), "{err:?}");
        assert_eq!(err.http_status_code(), Some(408));
        assert_eq!(upload.state(), UploadState::Canceled);
        assert_eq!(upload.progress(), QUANTUM as u64);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn headers() -> Result {
        static CLIENT: gaxi::api_header::ApiClient =
            gaxi::api_header::ApiClient {
                name: "drive",
                version: "3.0.0",
            };
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes 0-9/10"))),
                request::headers(contains(("content-type", "text/plain; charset=utf-8"))),
                request::headers(contains(("user-agent", matches(" drive/3.0.0$")))),
                request::headers(contains(("x-goog-api-client", matches("^gl-rust gdcl/")))),
                request::body("0123456789"),
            ])
            .respond_with(status_code(200)),
        );

        let options = MediaOptions::new().with_api_client(&CLIENT);
        let media = MediaInfo::buffered("0123456789", options).await?;
        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let _ = upload.upload(&CancellationToken::new()).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multipart_upload() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", SESSION),
                request::query(url_decoded(contains(("uploadType", "multipart")))),
                request::headers(contains((
                    "content-type",
                    matches("^multipart/related; boundary=[0-9a-f]{60}$")
                ))),
                request::body(matches("Content-Type: application/json\r\n\r\n\\{\"name\":\"greeting.txt\"\\}\r\n")),
                request::body(matches("Content-Type: text/plain; charset=utf-8\r\n\r\nhello world\r\n")),
            ])
            .respond_with(json_encoded(json!({"name": "greeting.txt"}))),
        );

        let media = MediaInfo::buffered("hello world", MediaOptions::new()).await?;
        let upload_type = media.upload_type();
        assert_eq!(upload_type, "multipart");
        let metadata = json!({"name": "greeting.txt"}).to_string();
        let (body, content_type) = media.into_multipart(Bytes::from(metadata), "application/json");
        let response = reqwest::Client::new()
            .post(server.url_str(SESSION))
            .query(&[("uploadType", upload_type)])
            .header("content-type", content_type)
            .body(body.into_body())
            .send()
            .await?;
        assert!(response.status().is_success(), "{response:?}");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn detected_type_in_each_chunk() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes 0-262143/*"))),
                request::headers(contains(("content-type", "text/plain; charset=utf-8"))),
                request::body(matches("^abcdefghijklmnopqrstuvwxyzabc")),
            ])
            .respond_with(incomplete(QUANTUM - 1)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", SESSION),
                request::headers(contains(("content-range", "bytes 262144-262153/262154"))),
                request::headers(contains(("content-type", "text/plain; charset=utf-8"))),
            ])
            .respond_with(status_code(200)),
        );

        let options = MediaOptions::new().with_chunk_size(QUANTUM as i64);
        let media = MediaInfo::buffered(text_payload(QUANTUM + 10), options).await?;
        assert_eq!(media.media_type(), Some("text/plain; charset=utf-8"));
        let mut upload = media.resumable_upload(reqwest::Client::new(), server.url_str(SESSION));
        let _ = upload.upload(&CancellationToken::new()).await?;
        assert_eq!(upload.progress(), QUANTUM as u64 + 10);
        Ok(())
    }
}
