//! Integration tests for the cdr-web HTTP API

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cdr_refine::{Orchestrator, RefinementConfig};
use cdr_web::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "cdr-test-boundary";

const CRASHES_CSV: &str = "Crash ID,Crash Date,GPS Latitude,GPS Longitude,Weather\n\
                           A,2024-01-02,40.5,-89.5,Rain\n\
                           B,2024-01-03,40.6,-89.4,Clear\n\
                           C,2024-01-04,45.0,-89.5,Snow\n\
                           D,2024-01-05,,,Fog\n";

const AREA_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document><Placemark><Polygon>
<outerBoundaryIs><LinearRing><coordinates>
-90,40,0 -89,40,0 -89,41,0 -90,41,0 -90,40,0
</coordinates></LinearRing></outerBoundaryIs>
</Polygon></Placemark></Document></kml>
"#;

enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        content: &'a str,
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match part {
            Part::File {
                name,
                file_name,
                content,
            } => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n{content}\r\n"
                ));
            }
            Part::Text { name, value } => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                ));
            }
        }
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body.into_bytes()
}

fn upload_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart(parts)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn test_app(root: &TempDir) -> Router {
    let orchestrator = Arc::new(Orchestrator::new(root.path().join("runs")));
    let state = AppState::new(
        orchestrator,
        root.path().join("uploads"),
        RefinementConfig {
            required_columns: vec!["Crash ID".to_string()],
            date_columns: vec!["Crash Date".to_string()],
            ..RefinementConfig::default()
        },
        10 * 1024 * 1024,
    );
    build_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn run_parts<'a>() -> Vec<Part<'a>> {
    vec![
        Part::File {
            name: "data_file",
            file_name: "crashes.csv",
            content: CRASHES_CSV,
        },
        Part::File {
            name: "boundary_file",
            file_name: "area.kml",
            content: AREA_KML,
        },
    ]
}

async fn wait_for_terminal(app: &Router, run_id: &str) -> Value {
    for _ in 0..500 {
        let (status, snapshot) = send_json(app, get(&format!("/api/run/{run_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let state = snapshot["status"].as_str().unwrap_or_default().to_string();
        if ["success", "failed", "cancelled"].contains(&state.as_str()) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} did not finish");
}

#[tokio::test]
async fn test_health_check() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);

    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "cdr-web");
    assert!(body.get("active_run").is_none());
}

#[tokio::test]
async fn test_settings_report_defaults() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);

    let (status, body) = send_json(&app, get("/api/settings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["maxUploadBytes"], 10 * 1024 * 1024);
    assert_eq!(body["logRetention"], 1500);
    assert!(body["dataExtensions"]
        .as_array()
        .unwrap()
        .contains(&Value::from(".xlsx")));
    assert_eq!(body["labelOrders"][1], "west_to_east");
}

#[tokio::test]
async fn test_preview_guesses_coordinates() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);

    let request = upload_request(
        "/api/preview",
        &[Part::File {
            name: "data_file",
            file_name: "crashes.csv",
            content: CRASHES_CSV,
        }],
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fileName"], "crashes.csv");
    assert_eq!(body["headers"][0], "Crash ID");
    assert_eq!(body["guess"]["latitude"], "GPS Latitude");
    assert_eq!(body["guess"]["longitude"], "GPS Longitude");

    // Preview uploads are not kept
    let leftovers = std::fs::read_dir(root.path().join("uploads")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_rejects_unsupported_upload() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);

    let request = upload_request(
        "/api/run",
        &[Part::File {
            name: "data_file",
            file_name: "crashes.txt",
            content: CRASHES_CSV,
        }],
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_run_requires_boundary() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);

    let request = upload_request(
        "/api/run",
        &[Part::File {
            name: "data_file",
            file_name: "crashes.csv",
            content: CRASHES_CSV,
        }],
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid request: Missing boundary file");
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);
    let id = uuid::Uuid::new_v4();

    for uri in [
        format!("/api/run/{id}"),
        format!("/api/run/{id}/log?since=3"),
        format!("/api/run/{id}/result"),
        format!("/api/run/{id}/download/crashes_refined.csv"),
    ] {
        let (status, body) = send_json(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    let (status, _) = send(&app, get("/api/run/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_run_lifecycle() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);

    let (status, started) = send_json(&app, upload_request("/api/run", &run_parts())).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{started}");
    assert_eq!(started["latColumn"], "GPS Latitude");
    assert_eq!(started["lonColumn"], "GPS Longitude");
    let run_id = started["runId"].as_str().unwrap().to_string();

    let snapshot = wait_for_terminal(&app, &run_id).await;
    assert_eq!(snapshot["status"], "success", "{snapshot}");
    assert_eq!(snapshot["inputs"]["dataFile"], "crashes.csv");
    assert_eq!(snapshot["lastLog"], "Refinement complete.");

    let (status, log) = send_json(&app, get(&format!("/api/run/{run_id}/log?since=0"))).await;
    assert_eq!(status, StatusCode::OK);
    let last_seq = log["lastSeq"].as_u64().unwrap();
    assert_eq!(log["entries"].as_array().unwrap().len() as u64, last_seq);
    let (_, tail) = send_json(
        &app,
        get(&format!("/api/run/{run_id}/log?since={last_seq}")),
    )
    .await;
    assert!(tail["entries"].as_array().unwrap().is_empty());

    let (status, result) = send_json(&app, get(&format!("/api/run/{run_id}/result"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["report"]["total_rows"], 4);
    assert_eq!(result["report"]["kept_rows"], 2);
    assert_eq!(result["mapReport"], "Crash Data Refiner Map Report.html");
    assert_eq!(result["manifest"]["files"].as_array().unwrap().len(), 5);

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/run/{run_id}/download/crashes_refined.csv"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    let csv = response.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(csv.to_vec()).unwrap();
    assert!(csv.starts_with("crash_id,"));
    assert_eq!(csv.lines().count(), 3);

    let view_uri = format!("/api/run/{run_id}/view/Crash%20Data%20Refiner%20Map%20Report.html");
    let (status, html) = send(&app, get(&view_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(html).unwrap().contains("leaflet"));

    let (status, _) = send_json(
        &app,
        get(&format!("/api/run/{run_id}/download/crashes.csv")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let cancel = Request::builder()
        .method("POST")
        .uri(format!("/api/run/{run_id}/cancel"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app, cancel).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/run/{run_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&app, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(&app, get(&format!("/api/run/{run_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clear_finished_runs() {
    let root = TempDir::new().unwrap();
    let app = test_app(&root);
    let clear_all = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/runs")
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send_json(&app, clear_all()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 0);

    let (status, started) = send_json(&app, upload_request("/api/run", &run_parts())).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{started}");
    let run_id = started["runId"].as_str().unwrap().to_string();
    wait_for_terminal(&app, &run_id).await;

    let (_, runs) = send_json(&app, get("/api/runs")).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);

    let (status, body) = send_json(&app, clear_all()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, runs) = send_json(&app, get("/api/runs")).await;
    assert!(runs.as_array().unwrap().is_empty());
    let (status, _) = send_json(&app, get(&format!("/api/run/{run_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
