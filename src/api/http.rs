//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::stashes;
use super::state::AppState;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/stashes", get(stashes::list_stashes).post(stashes::create_stash))
        .route("/stashes/:name", get(stashes::get_stash))
        .route("/buffer", get(stashes::get_buffer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{EventBuffer, RingEventBuffer};
    use crate::stash::{
        FileStashStorage, StashManager, StashManagerConfig, StashStorage, StorageError,
        DEFAULT_STASH_PREFIX,
    };
    use crate::types::{Event, EventType, Stash, StashStatus};
    use crate::utils::ManualClock;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use tempfile::TempDir;
    use tower::util::ServiceExt;
    use tracing::Span;

    /// File storage whose writes wait until `open` is called
    struct HeldStorage {
        inner: FileStashStorage,
        open: parking_lot::Mutex<bool>,
        opened: parking_lot::Condvar,
    }

    impl HeldStorage {
        fn open(&self) {
            *self.open.lock() = true;
            self.opened.notify_all();
        }
    }

    impl StashStorage for HeldStorage {
        fn write(&self, name: &str, payload: &[u8]) -> Result<(), StorageError> {
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
            drop(open);
            self.inner.write(name, payload)
        }

        fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.read(name)
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.inner.list(prefix)
        }

        fn delete(&self, name: &str) -> Result<(), StorageError> {
            self.inner.delete(name)
        }
    }

    struct Fixture {
        router: Router,
        manager: Arc<StashManager>,
        buffer: Arc<RingEventBuffer>,
        clock: Arc<ManualClock>,
        dir: TempDir,
    }

    fn file_storage(dir: &TempDir) -> FileStashStorage {
        FileStashStorage::open(dir.path(), DEFAULT_STASH_PREFIX, &Span::none()).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(file_storage(&dir));
        fixture_with(dir, storage)
    }

    fn fixture_with(dir: TempDir, storage: Arc<dyn StashStorage>) -> Fixture {
        let buffer = Arc::new(RingEventBuffer::new(4).unwrap());
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let config = StashManagerConfig {
            max_stashes: 2,
            ..Default::default()
        };
        let manager = Arc::new(
            StashManager::with_clock(config, buffer.clone(), storage, clock.clone(), Span::none())
                .unwrap(),
        );

        Fixture {
            router: create_router(Arc::new(AppState::new(Arc::clone(&manager)))),
            manager,
            buffer,
            clock,
            dir,
        }
    }

    async fn error_code(response: Response) -> String {
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        body["code"].as_str().unwrap_or_default().to_string()
    }

    async fn send(router: &Router, method: Method, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let fx = fixture();
        let response = send(&fx.router, Method::GET, "/health").await;
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_create_and_fetch_stash() {
        let fx = fixture();
        fx.buffer.add(Arc::new(Event::new("a", EventType::Warning, "OOMKilled")));

        let response = send(&fx.router, Method::POST, "/stashes").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let name = body_string(response).await;
        assert_eq!(name, "event-log-20231114T221320");

        let response = send(&fx.router, Method::GET, &format!("/stashes/{}", name)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let events: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(events[0]["message"], "OOMKilled");

        let response = send(&fx.router, Method::GET, "/stashes").await;
        let stashes: Vec<Stash> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(stashes.len(), 1);
        assert_eq!(stashes[0].status, StashStatus::Complete);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let fx = fixture();
        assert_eq!(send(&fx.router, Method::POST, "/stashes").await.status(), StatusCode::CREATED);

        let response = send(&fx.router, Method::POST, "/stashes").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], "ALREADY_EXISTS");

        fx.clock.advance_secs(1);
        assert_eq!(send(&fx.router, Method::POST, "/stashes").await.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_unknown_stash_not_found() {
        let fx = fixture();
        let response = send(&fx.router, Method::GET, "/stashes/event-log-nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_started_stash_is_in_progress() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(HeldStorage {
            inner: file_storage(&dir),
            open: parking_lot::Mutex::new(false),
            opened: parking_lot::Condvar::new(),
        });
        let fx = fixture_with(dir, storage.clone());

        let pending = fx.manager.trigger_stash().unwrap();
        let uri = format!("/stashes/{}", pending.name());

        let response = send(&fx.router, Method::GET, &uri).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await, "IN_PROGRESS");

        storage.open();
        pending.wait().await.unwrap();
        assert_eq!(send(&fx.router, Method::GET, &uri).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failed_write_is_internal_error_then_not_found() {
        let fx = fixture();
        // A directory squatting on the payload path makes the write fail
        std::fs::create_dir(fx.dir.path().join("event-log-20231114T221320.json")).unwrap();

        let response = send(&fx.router, Method::POST, "/stashes").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_code(response).await, "INTERNAL_ERROR");

        let response = send(&fx.router, Method::GET, "/stashes").await;
        let stashes: Vec<Stash> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(stashes.len(), 1);
        assert_eq!(stashes[0].status, StashStatus::Failed);

        let response = send(&fx.router, Method::GET, "/stashes/event-log-20231114T221320").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_live_buffer() {
        let fx = fixture();
        let response = send(&fx.router, Method::GET, "/buffer").await;
        assert_eq!(body_string(response).await, "[]");

        fx.buffer.add(Arc::new(Event::new("x", EventType::Normal, "Scheduled")));
        let response = send(&fx.router, Method::GET, "/buffer").await;
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
        let events: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(events[0]["metadata"]["uid"], "x");
    }
}
