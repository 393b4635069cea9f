#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use ui_forge::config::Config;
use ui_forge::orchestrator::Orchestrator;
use ui_forge::preview::{IsolationLevel, PreviewService};
use ui_forge::routes::{router, AppState};
use ui_forge::store::{MemoryStore, ScreenshotFiles};
use ui_forge::stylesheet::TokenStylesheet;
use ui_forge::tokens::DesignTokens;
use ui_forge::v0::{CompletionApi, CompletionRequest, UpstreamError};

pub const BUTTON: &str = r#"export default function Button() {
  const [count, setCount] = useState(0);
  return (
    <button className="bg-primary text-primary-foreground rounded-md px-4 py-2" onClick={() => setCount(count + 1)}>
      Clicked {count} times
    </button>
  );
}"#;

pub const PNG_1X1: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

/// Replies to completion calls from a queue, recording every request.
#[derive(Default)]
pub struct ScriptedApi {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedApi {
    pub fn new(replies: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionApi for ScriptedApi {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        self.requests.lock().push(request.clone());
        self.replies.lock().pop_front().unwrap_or(Err(UpstreamError::EmptyResponse))
    }
}

pub struct TestApp {
    pub router: Router,
    pub api: Arc<ScriptedApi>,
    pub screenshots: TempDir,
}

impl TestApp {
    pub fn new(replies: Vec<Result<String, UpstreamError>>) -> Self {
        let api = ScriptedApi::new(replies);
        Self::build(Some(api.clone()), api)
    }

    /// No API key configured.
    pub fn unconfigured() -> Self {
        Self::build(None, ScriptedApi::new(Vec::new()))
    }

    fn build(api: Option<Arc<ScriptedApi>>, handle: Arc<ScriptedApi>) -> Self {
        let screenshots = tempfile::tempdir().expect("tempdir");
        let config = Config {
            screenshot_dir: screenshots.path().to_path_buf(),
            ..Config::default()
        };
        let tokens = Arc::new(DesignTokens::embedded().expect("tokens"));
        let store = Arc::new(MemoryStore::new());
        let state = AppState {
            store: store.clone(),
            orchestrator: Arc::new(Orchestrator::new(
                store,
                api.map(|api| api as Arc<dyn CompletionApi>),
                tokens.clone(),
                Arc::new(TokenStylesheet::new(tokens.clone())),
            )),
            previews: Arc::new(PreviewService::new(tokens, IsolationLevel::Untrusted)),
            screenshots: Arc::new(ScreenshotFiles::new(screenshots.path())),
        };
        Self {
            router: router(state, &config),
            api: handle,
            screenshots,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, text) = self.request_text(method, uri, body).await;
        let json = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn request_text(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }
}
