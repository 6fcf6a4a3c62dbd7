use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use filebin::config::{RemoteStoreConfig, UploadConfig};
use filebin::models::FileReader;
use filebin::services::storage::{LocalStagingStorage, StorageBackend, StorageError};
use filebin::services::upload_service::UploadService;
use filebin::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncReadExt;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";
const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Stand-in for the object store: keeps nothing, answers with a fake URL
#[derive(Default)]
struct FakeObjectStore {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl StorageBackend for FakeObjectStore {
    async fn store(
        &self,
        mut reader: FileReader,
        destination_hint: &str,
        _mime_type: &str,
    ) -> Result<String, StorageError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();

        if self.fail {
            return Err(StorageError::Transfer {
                key: format!("uploads/{}", n),
                bucket: "filebin-test".to_string(),
                reason: "AccessDenied".to_string(),
            });
        }
        Ok(format!(
            "https://filebin-test.s3.us-east-1.amazonaws.com/uploads/{}-{}",
            n, destination_hint
        ))
    }

    fn name(&self) -> &'static str {
        "fake-s3"
    }
}

fn setup_app(config: UploadConfig, remote: Arc<FakeObjectStore>) -> Router {
    let _ = tracing_subscriber::fmt::try_init();
    let local = Arc::new(LocalStagingStorage::new(config.staging_dir.clone()));
    let upload_service = Arc::new(UploadService::new(config, local, remote));

    create_app(AppState {
        upload_service,
        remote_store: RemoteStoreConfig {
            region: "us-east-1".to_string(),
            bucket: "filebin-test".to_string(),
            ..Default::default()
        },
    })
}

fn config_in(dir: &Path) -> UploadConfig {
    UploadConfig {
        staging_dir: dir.to_path_buf(),
        ..UploadConfig::default()
    }
}

fn png(size: usize) -> Vec<u8> {
    let mut data = PNG.to_vec();
    data.resize(size.max(PNG.len()), 0x42);
    data
}

fn multipart_body(files: &[(&str, &str, &[u8])], use_s3: bool) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, content) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
                Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    if use_s3 {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"s3\"\r\n\r\n\
                on\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn post_upload(app: Router, body: Vec<u8>) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "Non-JSON response with status {}: {:?}",
            status,
            String::from_utf8_lossy(&body)
        )
    });
    (status, json)
}

fn staged_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("upload-"))
        .collect()
}

#[tokio::test]
async fn test_upload_flow_local() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(config_in(dir.path()), Arc::default());

    let first = png(1024);
    let gif = b"GIF89a\x01\x00\x01\x00\x80\x00\x00".to_vec();
    let body = multipart_body(
        &[
            ("first.png", "image/png", first.as_slice()),
            ("second.gif", "image/gif", gif.as_slice()),
        ],
        false,
    );

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    assert_eq!(json["message"], "Files saved");
    assert_eq!(json["context"], serde_json::json!(["Use S3", "false"]));
    assert_eq!(json["status"], 201);

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["orig"], "first.png");
    assert_eq!(results[0]["mime_type"], "image/png");
    assert_eq!(results[1]["orig"], "second.gif");
    assert_eq!(results[1]["mime_type"], "image/gif");

    let dest = results[0]["dest"].as_str().unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), first);
    assert_ne!(results[0]["dest"], results[1]["dest"]);
    assert_eq!(staged_files(dir.path()).len(), 2);
}

#[tokio::test]
async fn test_text_file_rejects_whole_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(config_in(dir.path()), Arc::default());

    let body = multipart_body(
        &[
            ("a.png", "image/png", PNG),
            ("b.txt", "text/plain", b"Hello world".as_slice()),
        ],
        false,
    );

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["message"], "File type not allowed");
    assert_eq!(json["context"][0], "b.txt");
    assert_eq!(json["context"][4], "text/plain");
    assert!(json.get("results").is_none());
    assert!(staged_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_client_content_type_is_not_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(config_in(dir.path()), Arc::default());

    let body = multipart_body(&[("fake.png", "image/png", b"not an image at all".as_slice())], false);

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["context"][0], "fake.png");
}

#[tokio::test]
async fn test_oversized_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = UploadConfig {
        max_file_size: 320 * 1024,
        max_form_size: 4 * 1024 * 1024,
        ..config_in(dir.path())
    };
    let app = setup_app(config, Arc::default());

    let big = png(400 * 1024);
    let body = multipart_body(&[("big.png", "image/png", big.as_slice())], false);

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["message"], "File size exceeds the limit");
    assert_eq!(json["context"][0], "big.png");
    assert!(staged_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_body_over_form_limit() {
    let dir = tempfile::tempdir().unwrap();
    let config = UploadConfig {
        max_form_size: 64 * 1024,
        ..config_in(dir.path())
    };
    let app = setup_app(config, Arc::default());

    let big = png(256 * 1024);
    let body = multipart_body(&[("big.png", "image/png", big.as_slice())], false);

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json.get("results").is_none());
}

#[tokio::test]
async fn test_upload_flow_remote() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeObjectStore::default());
    let app = setup_app(config_in(dir.path()), remote.clone());

    let body = multipart_body(
        &[
            ("one.png", "image/png", png(64).as_slice()),
            ("two.png", "image/png", png(128).as_slice()),
            ("three.png", "image/png", png(256).as_slice()),
        ],
        true,
    );

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    assert_eq!(json["context"], serde_json::json!(["Use S3", "true"]));

    let results = json["results"].as_array().unwrap();
    let names: Vec<_> = results.iter().map(|r| r["orig"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["one.png", "two.png", "three.png"]);
    for result in results {
        assert!(
            result["dest"]
                .as_str()
                .unwrap()
                .starts_with("https://filebin-test.s3.us-east-1.amazonaws.com/")
        );
    }
    assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
    assert!(staged_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_remote_failure_is_single_500() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeObjectStore {
        fail: true,
        ..Default::default()
    });
    let app = setup_app(config_in(dir.path()), remote.clone());

    let body = multipart_body(
        &[("a.png", "image/png", PNG), ("b.png", "image/png", PNG)],
        true,
    );

    let (status, json) = post_upload(app, body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["message"], "Failed to upload file to S3 bucket");
    assert_eq!(json["context"][0], "a.png");
    assert!(json.get("results").is_none());
    // every dispatch ran even though the first one failed
    assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_form_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(config_in(dir.path()), Arc::default());

    let (status, json) = post_upload(app, multipart_body(&[], true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Unable to parse form");
    assert_eq!(json["context"][0], "No files provided");
}

#[tokio::test]
async fn test_non_multipart_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(config_in(dir.path()), Arc::default());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"files": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // a fresh id is generated when the caller sends none
    assert!(response.headers().contains_key("x-request-id"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(config_in(dir.path()), Arc::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "abc-123");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["staging_writable"], true);
    assert_eq!(json["remote_bucket"], "filebin-test");
}
