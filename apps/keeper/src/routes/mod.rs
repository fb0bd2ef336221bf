pub mod connectivity;
pub mod documents;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/documents/:key",
            get(documents::handle_get_document)
                .put(documents::handle_put_document)
                .delete(documents::handle_reset_document),
        )
        .route(
            "/api/v1/documents/:key/backups",
            get(documents::handle_list_backups),
        )
        .route(
            "/api/v1/documents/:key/backups/restore",
            post(documents::handle_restore_backup),
        )
        .route(
            "/api/v1/documents/:key/export",
            get(documents::handle_export),
        )
        .route(
            "/api/v1/documents/:key/import",
            post(documents::handle_import),
        )
        .route(
            "/api/v1/connectivity",
            get(connectivity::handle_connectivity),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::resilience::{ConnectivityMonitor, HttpProbe, SystemClock};
    use crate::storage::{KeyValueStore, MemoryStore, PersistenceGateway};

    fn app_with(store: Arc<MemoryStore>) -> Router {
        let clock = Arc::new(SystemClock);
        let state = AppState {
            gateway: Arc::new(PersistenceGateway::new(store, clock.clone())),
            monitor: Arc::new(ConnectivityMonitor::new(
                true,
                Arc::new(HttpProbe::default()),
                clock,
            )),
            config: Config::default(),
        };
        build_router(state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn document(name: &str) -> Value {
        let mut doc = serde_json::to_value(crate::models::document::ResumeDocument::default()).unwrap();
        doc["personalInfo"]["fullName"] = json!(name);
        doc
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "resume-keeper");
    }

    #[tokio::test]
    async fn test_first_read_creates_empty_document() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let (status, body) = send(&app, Method::GET, "/api/v1/documents/resume", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"]["kind"], "created");
        assert_eq!(body["document"]["version"], 2);
        assert_eq!(body["recoveredFields"], json!([]));
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let (status, _) = send(&app, Method::PUT, "/api/v1/documents/resume", Some(document("Jane"))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/v1/documents/resume", None).await;
        assert_eq!(body["source"]["kind"], "stored");
        assert_eq!(body["document"]["personalInfo"]["fullName"], "Jane");
    }

    #[tokio::test]
    async fn test_put_invalid_document_is_rejected_with_details() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let mut doc = document("Jane");
        doc["personalInfo"]["email"] = json!("not-an-email");
        let (status, body) = send(&app, Method::PUT, "/api/v1/documents/resume", Some(doc)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_DOCUMENT");
        assert_eq!(body["error"]["details"][0]["fieldPath"], "personalInfo.email");
    }

    #[tokio::test]
    async fn test_corrupted_entry_reads_as_recovered_manifest() {
        let store = Arc::new(MemoryStore::new());
        let mut doc = document("Jane");
        doc["skills"] = json!([{ "name": "Rust", "level": "" }, { "name": "" }]);
        store.set("doc:resume", &doc.to_string()).await.unwrap();
        let app = app_with(store);

        let (_, body) = send(&app, Method::GET, "/api/v1/documents/resume", None).await;
        assert_eq!(body["source"]["kind"], "recovered");
        let skills = body["recoveredFields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["field"] == "skills")
            .unwrap()
            .clone();
        assert_eq!(skills["action"], "filtered");
        assert_eq!(skills["kept"], 1);
        assert_eq!(skills["total"], 2);
    }

    #[tokio::test]
    async fn test_backup_shaped_document_key_leaves_backups_alone() {
        let app = app_with(Arc::new(MemoryStore::new()));
        send(&app, Method::PUT, "/api/v1/documents/resume", Some(document("Jane"))).await;

        let (status, body) =
            send(&app, Method::GET, "/api/v1/documents/resume:backups", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"]["kind"], "created");

        let (_, backups) = send(&app, Method::GET, "/api/v1/documents/resume/backups", None).await;
        assert_eq!(backups.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backups_restore_and_reset() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with(store.clone());
        send(&app, Method::PUT, "/api/v1/documents/resume", Some(document("First"))).await;

        let (_, backups) = send(&app, Method::GET, "/api/v1/documents/resume/backups", None).await;
        assert_eq!(backups.as_array().unwrap().len(), 1);

        store.set("doc:resume", "undefined").await.unwrap();
        let (status, restored) =
            send(&app, Method::POST, "/api/v1/documents/resume/backups/restore", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(restored["personalInfo"]["fullName"], "First");

        let (status, _) = send(&app, Method::DELETE, "/api/v1/documents/resume", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.is_empty());

        let (status, body) =
            send(&app, Method::POST, "/api/v1/documents/resume/backups/restore", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let (status, _) = send(&app, Method::GET, "/api/v1/documents/resume/export", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&app, Method::PUT, "/api/v1/documents/resume", Some(document("Jane"))).await;
        let (status, payload) = send(&app, Method::GET, "/api/v1/documents/resume/export", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["version"], 2);
        assert_eq!(payload["data"]["personalInfo"]["fullName"], "Jane");

        let (status, imported) =
            send(&app, Method::POST, "/api/v1/documents/other/import", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(imported["personalInfo"]["fullName"], "Jane");
    }

    #[tokio::test]
    async fn test_invalid_import_is_rejected() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/documents/resume/import",
            Some(json!({ "version": 2, "timestamp": "2026-01-01T00:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_BACKUP");
    }

    #[tokio::test]
    async fn test_connectivity_without_probe_url() {
        let app = app_with(Arc::new(MemoryStore::new()));
        let (status, body) = send(&app, Method::GET, "/api/v1/connectivity", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["online"], true);
        assert_eq!(body["reachable"], Value::Null);

        let (status, body) =
            send(&app, Method::GET, "/api/v1/connectivity?wait_ms=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["online"], true);
    }
}
