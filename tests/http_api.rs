use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::Mutex;
use tower::ServiceExt;

use pagebook::anthropic::model::{ContentBlock, MessageRequest, MessageResponse, ResponseBlock};
use pagebook::anthropic::{ModelError, ModelService};
use pagebook::diagnostics::NullSink;
use pagebook::handlers::{router, AppState, SECRET_HEADER};
use pagebook::import::Importer;
use pagebook::retry::RetryPolicy;
use pagebook::store::{FsPageStore, PageStore};
use pagebook::worker::ConversionSettings;

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "pagebook-boundary";

/// Answers every request with the same page and keeps the requests.
#[derive(Clone, Default)]
struct ScriptedModel {
    requests: Arc<Mutex<Vec<MessageRequest>>>,
}

#[async_trait::async_trait]
impl ModelService for ScriptedModel {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, ModelError> {
        self.requests.lock().await.push(request.clone());
        Ok(MessageResponse {
            content: vec![ResponseBlock::Text {
                text: "# Report\n\n![chart](/api/assets/Report/Report-1.png)".into(),
            }],
            stop_reason: Some("end_turn".into()),
        })
    }
}

fn app_with(model: Option<Arc<dyn ModelService>>) -> (Router, Arc<FsPageStore>, TempDir) {
    let td = tempdir().unwrap();
    let store = Arc::new(FsPageStore::new(td.path()));
    let settings = ConversionSettings {
        model: "claude-test".into(),
        max_tokens: 1024,
        retry: RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
        },
    };
    let importer = Importer::new(model, store.clone(), Arc::new(NullSink), settings, 3);
    let state = AppState {
        store: store.clone(),
        importer: Arc::new(importer),
        shared_secret: SECRET.into(),
    };
    (router(state, 1024 * 1024), store, td)
}

// no model configured: imports are rejected with MissingCredential
fn app() -> (Router, Arc<FsPageStore>, TempDir) {
    app_with(None)
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match filename {
            Some(f) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                name, f
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    Body::from(body)
}

fn upload(uri: &str, body: Body) -> Request<Body> {
    Request::post(uri)
        .header(SECRET_HEADER, SECRET)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", SECRET))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(SECRET_HEADER, SECRET)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_secret_are_rejected() {
    let (app, _store, _td) = app();

    let res = app
        .clone()
        .oneshot(Request::get("/api/pages").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(
            Request::get("/api/pages")
                .header(SECRET_HEADER, "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn import_rejects_empty_upload_and_missing_key() {
    let (app, _store, _td) = app();

    let res = app
        .clone()
        .oneshot(upload("/api/import", multipart(&[("instructions", None, "x")])))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "no files were uploaded");

    let res = app
        .oneshot(upload(
            "/api/import",
            multipart(&[("file", Some("Doc.html"), "<p>hi</p>")]),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "model API key is not configured");
}

#[tokio::test]
async fn ingest_turns_csv_into_table_page() {
    let (app, store, _td) = app();

    let res = app
        .oneshot(upload(
            "/api/ingest",
            multipart(&[("file", Some("uploads/Costs.csv"), "a,b\n1,2\n")]),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["results"][0]["slug"], "Costs");
    assert_eq!(body["results"][0]["success"], true);

    let content = store.read_page_content("Costs").await.unwrap();
    assert!(content.starts_with("# Costs\n\n| a | b |"));
}

#[tokio::test]
async fn page_lifecycle_round_trip() {
    let (app, store, _td) = app();

    let res = app
        .clone()
        .oneshot(json_request("POST", "/api/pages", json!({ "slug": "Notes" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .clone()
        .oneshot(json_request("PUT", "/api/pages/Notes", json!({ "content": "# Notes" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app.clone().oneshot(authed_get("/api/pages/Notes")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["content"], "# Notes");

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/pages/move",
            json!({ "slug": "Notes", "new_name": "Journal", "new_parent": "Archive" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["slug"], "Archive/Journal");

    let res = app.clone().oneshot(authed_get("/api/pages")).await.unwrap();
    let tree = body_json(res).await;
    assert_eq!(tree[0]["name"], "Archive");
    assert_eq!(tree[0]["children"][0]["slug"], "Archive/Journal");

    let res = app
        .clone()
        .oneshot(json_request("DELETE", "/api/pages/Archive/Journal", Value::Null))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app.oneshot(authed_get("/api/pages/Archive/Journal")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(store.read_page_content("Notes").await.is_err());
}

#[tokio::test]
async fn assets_are_served_with_sniffed_type() {
    let (app, store, _td) = app();
    store.create_page("Trip").await.unwrap();
    // PNG bytes under a .jpg name
    store
        .save_asset("Trip", "photo.jpg", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(authed_get("/api/assets/Trip/photo.jpg"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");

    let res = app.oneshot(authed_get("/api/assets/Trip/missing.png")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn import_returns_report_json() {
    let model = ScriptedModel::default();
    let shared: Arc<dyn ModelService> = Arc::new(model.clone());
    let (app, store, _td) = app_with(Some(shared));

    let res = app
        .oneshot(upload(
            "/api/import",
            multipart(&[
                ("files", Some("export/Report.html"), "<h1>Report</h1>"),
                ("file", Some("dir/Report-1.png"), "chart-bytes"),
                ("file", Some("Orphan.png"), "orphan-bytes"),
                ("instructions", None, "keep the chart near the top"),
            ]),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report = body_json(res).await;
    assert_eq!(
        report,
        json!({
            "results": [{ "name": "Report", "slug": "Report", "success": true }],
            "unmatched_assets": ["Orphan.png"]
        })
    );

    assert!(store
        .read_page_content("Report")
        .await
        .unwrap()
        .starts_with("# Report"));
    assert_eq!(
        store.read_asset("Report", "Report-1.png").await.unwrap(),
        b"chart-bytes"
    );

    let requests = model.requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    let text: String = requests[0].messages[0]
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert!(text.contains("keep the chart near the top"));
    assert!(text.contains("- Report-1.png: /api/assets/Report/Report-1.png"));
}

#[tokio::test]
async fn asset_reads_accept_secret_in_query() {
    let (app, store, _td) = app();
    store.create_page("My-Trip").await.unwrap();
    store
        .save_asset("My-Trip", "My Trip_beach.png", &[0x89, 0x50, 0x4E, 0x47])
        .await
        .unwrap();

    let uri = format!("/api/assets/My-Trip/My%20Trip_beach.png?secret={}", SECRET);
    let res = app
        .clone()
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");

    let res = app
        .clone()
        .oneshot(
            Request::get("/api/assets/My-Trip/My%20Trip_beach.png?secret=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // the query form is limited to asset reads
    let res = app
        .oneshot(
            Request::get(format!("/api/pages?secret={}", SECRET).as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
