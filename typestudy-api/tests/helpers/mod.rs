//! Shared setup for typestudy-api integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use typestudy_api::auth::AccessTokenSource;
use typestudy_api::drive::{DriveError, DriveStore, MemoryDrive};
use typestudy_api::{build_router, AppState};
use typestudy_common::config::{BackendKind, CliOverrides, ServiceConfig, TomlConfig};

pub const ROOT: &str = "root";

/// Token source that always returns the same token
pub struct StaticTokens(pub &'static str);

#[async_trait::async_trait]
impl AccessTokenSource for StaticTokens {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn access_token(&self) -> Result<String, DriveError> {
        Ok(self.0.to_string())
    }
}

/// App backed by an in-memory drive, plus a handle on that drive
pub fn setup_app() -> (Router, Arc<MemoryDrive>) {
    setup_app_with_tokens(None)
}

/// Same as [`setup_app`], with an upload token source
pub fn setup_app_with_tokens(tokens: Option<Arc<dyn AccessTokenSource>>) -> (Router, Arc<MemoryDrive>) {
    let cli = CliOverrides {
        backend: Some(BackendKind::Memory),
        ..Default::default()
    };
    let toml = TomlConfig {
        read_retries: Some(1),
        retry_backoff_ms: Some(1),
        ..Default::default()
    };
    let config = ServiceConfig::resolve_with(&cli, &toml, |_| None).expect("memory config resolves");

    let drive = Arc::new(MemoryDrive::new());
    let state = AppState::new(drive.clone(), tokens, &config);
    (build_router(state), drive)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// `multipart/form-data` request; `file` is sent as a binary part
pub fn multipart_request(uri: &str, fields: &[(&str, &str)], file: Option<&[u8]>) -> Request<Body> {
    let boundary = "----typestudy-test-boundary";
    let mut body: Vec<u8> = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(data) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"bundle.zip\"\r\nContent-Type: application/zip\r\n\r\n",
                boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Contents of a file in the root folder, if present
pub async fn read_root_file(drive: &MemoryDrive, name: &str) -> Option<String> {
    let file = drive.find_file(ROOT, name).await.unwrap()?;
    let bytes = drive.download(&file.id).await.unwrap();
    Some(String::from_utf8(bytes).unwrap())
}
