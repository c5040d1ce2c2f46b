//! HTTP API tests against an in-memory pipeline

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use casefile_common::types::{
    DeadLetterView, EnqueueResponse, ErrorBody, JobStatus, JobStatusView, ReplayResponse,
    SourceRef, StageExecutionView, StageName,
};
use casefile_server::config::Config;
use casefile_server::create_router;
use casefile_server::features::health::HealthResponse;
use casefile_server::features::jobs::queries::ListJobsResponse;
use casefile_server::ingest::framework::StageError;
use common::{fast_config, init_tracing, mbox, TestPipeline};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

fn app(t: &TestPipeline) -> Router {
    create_router(Arc::clone(&t.pipeline), &Config::default())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        },
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn json<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

fn enqueue_body(source: &SourceRef) -> serde_json::Value {
    serde_json::json!({ "source_ref": source })
}

#[tokio::test]
async fn test_health_reports_queue_depth() {
    let t = TestPipeline::new(fast_config());
    let source = t.put_archive("health.mbox", &mbox("health", 2)).await;
    t.pipeline.enqueue(source).await.unwrap();

    let (status, body) = send(&app(&t), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = json(&body);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.backend, "memory");
    assert_eq!(health.queue.unwrap().ready, 1);
}

#[tokio::test]
async fn test_enqueue_then_follow_job_to_completion() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let app = app(&t);
    let source = t.put_archive("api.mbox", &mbox("api", 10)).await;

    let (status, body) = send(&app, Method::POST, "/api/v1/jobs", Some(enqueue_body(&source))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let enqueued: EnqueueResponse = json(&body);
    assert!(enqueued.created);

    let (status, body) = send(&app, Method::POST, "/api/v1/jobs", Some(enqueue_body(&source))).await;
    assert_eq!(status, StatusCode::OK);
    let again: EnqueueResponse = json(&body);
    assert_eq!(again.job_id, enqueued.job_id);
    assert!(!again.created);

    let uri = format!("/api/v1/jobs/{}", enqueued.job_id);
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let view: JobStatusView = json(&body);
    assert_eq!(view.status, JobStatus::Queued);
    assert_eq!(view.current_stage, StageName::Extract);

    t.run_until_idle().await;

    let (_, body) = send(&app, Method::GET, &uri, None).await;
    let view: JobStatusView = json(&body);
    assert_eq!(view.status, JobStatus::Completed);

    let (status, body) = send(&app, Method::GET, &format!("{uri}/executions"), None).await;
    assert_eq!(status, StatusCode::OK);
    let history: Vec<StageExecutionView> = json(&body);
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].stage_name, StageName::Extract);

    let (status, body) = send(&app, Method::GET, "/api/v1/jobs?status=completed&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: ListJobsResponse = json(&body);
    assert_eq!(listed.count, 1);
    assert_eq!(listed.jobs[0].job_id, enqueued.job_id);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let t = TestPipeline::new(fast_config());
    let app = app(&t);

    let bad = SourceRef::new("mem://x.mbox", "nothex");
    let (status, body) = send(&app, Method::POST, "/api/v1/jobs", Some(enqueue_body(&bad))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorBody = json(&body);
    assert_eq!(error.error, "bad_request");

    let (status, _) = send(&app, Method::GET, "/api/v1/jobs?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/jobs/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorBody = json(&body);
    assert_eq!(error.error, "not_found");

    let (status, _) = send(&app, Method::GET, "/api/v1/jobs/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/dead-letters/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dead_letter_list_get_and_replay() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let app = app(&t);
    let stored = t.put_archive("dl.mbox", &mbox("dl", 3)).await;
    // the archive does not match its declared hash: fatal at extract
    let source = SourceRef::new(stored.location, "0".repeat(64));
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;
    t.run_until_idle().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/dead-letters", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: serde_json::Value = json(&body);
    assert_eq!(listed["count"], 1);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/dead-letters/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let entry: DeadLetterView = json(&body);
    assert_eq!(entry.stage_name, StageName::Extract);
    assert!(entry.last_error.contains(&StageError::CorruptInput(String::new()).to_string()));

    let uri = format!("/api/v1/dead-letters/{job_id}/replay");
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let replay: ReplayResponse = json(&body);
    assert_eq!(replay.replay_of, job_id);
    assert_ne!(replay.job_id, job_id);

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/jobs/{}", replay.job_id), None).await;
    let view: JobStatusView = json(&body);
    assert_eq!(view.replay_of, Some(job_id));
    assert_eq!(view.status, JobStatus::Queued);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/dead-letters/{}/replay", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
