#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use meshvault_api::auth::jwt::{generate_access_token, JwtConfig};
use meshvault_api::config::ServerConfig;
use meshvault_api::router::build_app_router;
use meshvault_api::state::AppState;
use meshvault_core::types::{JobId, UserId};
use meshvault_db::MemoryJobStore;
use meshvault_pipeline::driver::SimulationDriver;
use meshvault_pipeline::{PipelineConfig, ProcessingDriver};
use meshvault_storage::LocalBlobStore;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";
pub const PUBLIC_URL: &str = "http://localhost:3000/files";
pub const PLACEHOLDER_URL: &str = "https://cdn.example.com/placeholder.glb";
pub const BOUNDARY: &str = "meshvault-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// The full application over an in-memory store, temp-dir blob storage and
/// an instant simulation driver.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryJobStore>,
    pub storage: TempDir,
    pub work: TempDir,
}

pub fn build_test_app() -> TestApp {
    let storage = tempfile::tempdir().expect("storage dir");
    let work = tempfile::tempdir().expect("work dir");

    let config = test_config();
    let pipeline = PipelineConfig {
        work_dir: work.path().to_path_buf(),
        simulation_time_scale: 0.0,
        max_upload_bytes: 64 * 1024,
        placeholder_model_url: PLACEHOLDER_URL.to_string(),
        ..PipelineConfig::default()
    };

    let store = Arc::new(MemoryJobStore::new());
    let blobs = Arc::new(LocalBlobStore::new(storage.path(), PUBLIC_URL));
    let driver = ProcessingDriver::Simulation(SimulationDriver::new(0.0, PLACEHOLDER_URL));

    let state = AppState::new(store.clone(), blobs, driver, config.clone(), pipeline);
    let router = build_app_router(state, &config, Some(storage.path().to_path_buf()));

    TestApp {
        router,
        store,
        storage,
        work,
    }
}

/// A user id and a valid bearer token for it.
pub fn user() -> (UserId, String) {
    let id = Uuid::new_v4();
    let token = generate_access_token(id, &test_config().jwt).expect("token");
    (id, token)
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(request(Method::GET, uri, token, Body::empty())).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(request(Method::POST, uri, token, Body::empty())).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(request(Method::DELETE, uri, token, Body::empty())).await
    }

    /// POST a multipart submission. `file` is `(filename, bytes)`.
    pub async fn submit(
        &self,
        token: Option<&str>,
        file: Option<(&str, &[u8])>,
        user_id: Option<&str>,
    ) -> Response<Body> {
        let mut req = request(Method::POST, "/api/v1/jobs", token, Body::from(multipart_body(file, user_id)));
        req.headers_mut().insert(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}").parse().unwrap(),
        );
        self.send(req).await
    }

    /// Submit a small valid video and return the new job id.
    pub async fn submit_video(&self, token: &str) -> JobId {
        let response = self.submit(Some(token), Some(("scan.mp4", VIDEO)), None).await;
        assert_eq!(response.status(), 201);
        let json = body_json(response).await;
        json["data"]["job_id"].as_str().unwrap().parse().unwrap()
    }

    /// Poll `GET /jobs/{id}` until the job is terminal and return its JSON.
    pub async fn wait_for_terminal(&self, token: &str, job_id: JobId) -> Value {
        let uri = format!("/api/v1/jobs/{job_id}");
        for _ in 0..250 {
            let json = body_json(self.get(&uri, Some(token)).await).await;
            let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
            if status == "completed" || status == "failed" {
                return json["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} did not finish in time");
    }
}

pub const VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake video";

fn request(method: Method, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body).unwrap()
}

fn multipart_body(file: Option<(&str, &[u8])>, user_id: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(user_id) = user_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user_id\"\r\n\r\n{user_id}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
