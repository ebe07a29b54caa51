//! Integration tests for the `/api/v1/jobs` resource.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, user, PLACEHOLDER_URL, VIDEO};
use meshvault_core::job_status::JobStatus;
use meshvault_db::models::job::{NewJob, PublishedModel};
use meshvault_db::JobStore;
use uuid::Uuid;

async fn pending_job(app: &common::TestApp, owner: Uuid) -> Uuid {
    let job = app
        .store
        .insert(NewJob {
            id: Uuid::new_v4(),
            user_id: owner,
            filename: "scan.mp4".into(),
            status: JobStatus::Pending,
        })
        .await
        .unwrap();
    job.id
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = build_test_app();

    let response = app.get("/api/v1/jobs", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");

    let response = app.submit(None, Some(("scan.mp4", VIDEO)), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = build_test_app();
    let response = app.get("/api/v1/jobs", Some("not-a-token")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submission_runs_to_completion() {
    let app = build_test_app();
    let (user_id, token) = user();

    let job_id = app.submit_video(&token).await;
    let job = app.wait_for_terminal(&token, job_id).await;

    assert_eq!(job["status"], "completed");
    assert_eq!(job["user_id"], user_id.to_string());
    assert_eq!(job["filename"], "scan.mp4");
    assert_eq!(job["metadata"]["progress"], 100);
    assert_eq!(job["model_url"], PLACEHOLDER_URL);
    assert!(job["error"].is_null());
}

#[tokio::test]
async fn stored_video_is_served_from_files() {
    let app = build_test_app();
    let (_, token) = user();

    let job_id = app.submit_video(&token).await;
    let job = app.wait_for_terminal(&token, job_id).await;

    let key = job["video_path"].as_str().unwrap();
    let response = app.get(&format!("/files/{key}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_file_is_rejected_without_creating_a_job() {
    let app = build_test_app();
    let (user_id, token) = user();

    let response = app.submit(Some(&token), None, Some(&user_id.to_string())).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let list = body_json(app.get("/api/v1/jobs", Some(&token)).await).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unsupported_format_is_rejected() {
    let app = build_test_app();
    let (_, token) = user();

    let response = app.submit(Some(&token), Some(("scan.gif", VIDEO)), None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let app = build_test_app();
    let (_, token) = user();

    let response = app.submit(Some(&token), Some(("scan.mp4", b"")), None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submitting_for_another_user_is_forbidden() {
    let app = build_test_app();
    let (_, token) = user();
    let other = Uuid::new_v4().to_string();

    let response = app.submit(Some(&token), Some(("scan.mp4", VIDEO)), Some(&other)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn explicit_own_user_id_is_accepted() {
    let app = build_test_app();
    let (user_id, token) = user();

    let response = app
        .submit(Some(&token), Some(("scan.mov", VIDEO)), Some(&user_id.to_string()))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn other_users_job_is_forbidden() {
    let app = build_test_app();
    let (_, owner_token) = user();
    let (_, other_token) = user();

    let job_id = app.submit_video(&owner_token).await;
    let uri = format!("/api/v1/jobs/{job_id}");

    let response = app.get(&uri, Some(&other_token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Cannot view another user's job");

    let response = app.delete(&uri, Some(&other_token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post(&format!("{uri}/simulate"), Some(&other_token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = build_test_app();
    let (_, token) = user();

    let response = app.get(&format!("/api/v1/jobs/{}", Uuid::new_v4()), Some(&token)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_is_owner_scoped_newest_first_and_paginated() {
    let app = build_test_app();
    let (user_id, token) = user();
    let (other_id, _) = user();

    let first = pending_job(&app, user_id).await;
    let second = pending_job(&app, user_id).await;
    let third = pending_job(&app, user_id).await;
    pending_job(&app, other_id).await;

    let json = body_json(app.get("/api/v1/jobs", Some(&token)).await).await;
    let ids: Vec<String> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![third.to_string(), second.to_string(), first.to_string()]);

    let json = body_json(app.get("/api/v1/jobs?limit=1&offset=1", Some(&token)).await).await;
    let page = json["data"].as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["id"], second.to_string());
}

// ---------------------------------------------------------------------------
// Simulate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simulate_accepts_and_completes_a_pending_job() {
    let app = build_test_app();
    let (user_id, token) = user();
    let job_id = pending_job(&app, user_id).await;

    let response = app.post(&format!("/api/v1/jobs/{job_id}/simulate"), Some(&token)).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["job_id"], job_id.to_string());
    assert_eq!(json["data"]["accepted"], true);

    let job = app.wait_for_terminal(&token, job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["metadata"]["progress"], 100);
    assert_eq!(job["model_url"], PLACEHOLDER_URL);
}

#[tokio::test]
async fn simulate_on_finished_job_conflicts() {
    let app = build_test_app();
    let (_, token) = user();

    let job_id = app.submit_video(&token).await;
    app.wait_for_terminal(&token, job_id).await;

    let response = app.post(&format!("/api/v1/jobs/{job_id}/simulate"), Some(&token)).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_the_job_and_its_video() {
    let app = build_test_app();
    let (_, token) = user();

    let job_id = app.submit_video(&token).await;
    let job = app.wait_for_terminal(&token, job_id).await;
    let video = app.storage.path().join(job["video_path"].as_str().unwrap());
    assert!(video.exists());

    let uri = format!("/api/v1/jobs/{job_id}");
    let response = app.delete(&uri, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(!video.exists());
    assert_eq!(app.get(&uri, Some(&token)).await.status(), StatusCode::NOT_FOUND);
    assert!(app.store.find_by_id(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_the_published_model() {
    let app = build_test_app();
    let (user_id, token) = user();
    let job_id = pending_job(&app, user_id).await;

    let key = format!("models/{user_id}/{job_id}/final_mesh.ply");
    let model = app.storage.path().join(&key);
    std::fs::create_dir_all(model.parent().unwrap()).unwrap();
    std::fs::write(&model, b"ply\n").unwrap();

    app.store.start_processing(job_id, None).await.unwrap();
    let published = PublishedModel {
        url: format!("{}/{key}", common::PUBLIC_URL),
        path: Some(key.clone()),
    };
    let job = app.store.complete(job_id, &published).await.unwrap();
    assert_eq!(job.model_path.as_deref(), Some(key.as_str()));

    let uri = format!("/api/v1/jobs/{job_id}");
    let response = app.delete(&uri, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(!model.exists());
    assert!(app.store.find_by_id(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn ws_route_requires_authentication() {
    let app = build_test_app();
    let (user_id, _) = user();
    let job_id = pending_job(&app, user_id).await;

    let response = app.get(&format!("/api/v1/jobs/{job_id}/ws"), None).await;

    // A plain GET without credentials never opens a socket.
    assert!(response.status().is_client_error());
}
