use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{error, info, warn};

use regex::Regex;

const TEXT_MODEL: &str = "v0-1.5-md";
const VISION_MODEL: &str = "v0-1.5-lg";

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:tsx|typescript|ts|jsx|javascript|js)?\n?").expect("fence pattern"));
static CLOSING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n?```$").expect("fence pattern"));

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Client error ({status}): check the request. {reason}")]
    Client { status: u16, reason: String },
    #[error("Server error ({status}): the v0 API is temporarily unavailable. {reason}")]
    Server { status: u16, reason: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("The v0 API returned no code")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// A `data:image/...` URL attached to the user turn.
    pub image: Option<String>,
}

#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// The full streamed completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError>;
}

pub struct V0Client {
    client: Client,
    api_key: String,
    base_url: String,
}

impl V0Client {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let user_content = match &request.image {
            Some(url) => json!([
                {"type": "text", "text": request.user_prompt},
                {"type": "image_url", "image_url": {"url": url}}
            ]),
            None => json!(request.user_prompt),
        };
        json!({
            "model": if request.image.is_some() { VISION_MODEL } else { TEXT_MODEL },
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": user_content}
            ],
            "temperature": 0.2,
            "max_tokens": 4096,
            "stream": true
        })
    }
}

#[async_trait]
impl CompletionApi for V0Client {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        info!("🔗 Making request to: {} (image: {})", url, request.image.is_some());

        let mut response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default().to_string();
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ v0 API error response: {}", error_body);
            return Err(if status.is_client_error() {
                UpstreamError::Client { status: status.as_u16(), reason }
            } else {
                UpstreamError::Server { status: status.as_u16(), reason }
            });
        }

        let mut decoder = SseDecoder::default();
        let mut chunks = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(|e| UpstreamError::Network(e.to_string()))? {
            chunks += 1;
            decoder.push(&chunk);
            if decoder.is_done() {
                break;
            }
        }
        let text = decoder.finish();
        info!("✅ Stream finished: {} chunks, {} chars", chunks, text.len());

        let code = strip_code_fence(&text);
        if code.trim().is_empty() {
            return Err(UpstreamError::EmptyResponse);
        }
        Ok(code)
    }
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Reassembles `data:` events from a chat-completions stream.
///
/// Raw bytes are buffered until a full line is available, so events and
/// multi-byte characters split across network chunks decode correctly.
#[derive(Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    text: String,
    done: bool,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        if self.done {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            self.line(&line[..newline]);
            if self.done {
                self.buffer.clear();
                return;
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Flushes a final unterminated line and returns the accumulated text.
    pub fn finish(mut self) -> String {
        if !self.done && self.buffer.has_remaining() {
            let rest = std::mem::take(&mut self.buffer);
            self.line(&rest);
        }
        self.text
    }

    fn line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => {
                let delta = event.choices.into_iter().next().and_then(|c| c.delta).and_then(|d| d.content);
                if let Some(content) = delta {
                    self.text.push_str(&content);
                }
            }
            Err(e) => warn!("⚠️ Skipping undecodable stream event: {}", e),
        }
    }
}

/// Removes a leading language fence and a trailing fence, if present.
pub fn strip_code_fence(text: &str) -> String {
    let text = text.trim();
    let text = OPENING_FENCE.replace(text, "");
    CLOSING_FENCE.replace(&text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(content: &str) -> String {
        format!("data: {}\n\n", json!({"choices": [{"delta": {"content": content}}]}))
    }

    #[test]
    fn decodes_events_split_across_chunks() {
        let stream = format!("{}{}: keep-alive\n{}data: [DONE]\n\n{}", event("export "), event("default"), event(" function A() {}"), event("ignored"));
        let bytes = stream.as_bytes();
        let mut decoder = SseDecoder::default();
        for chunk in bytes.chunks(7) {
            decoder.push(chunk);
        }
        assert!(decoder.is_done());
        assert_eq!(decoder.finish(), "export default function A() {}");
    }

    #[test]
    fn multibyte_characters_survive_chunking() {
        let stream = event("버튼 ✅");
        let mut decoder = SseDecoder::default();
        for chunk in stream.as_bytes().chunks(1) {
            decoder.push(chunk);
        }
        assert_eq!(decoder.finish(), "버튼 ✅");
    }

    #[test]
    fn bad_events_are_skipped_and_tail_is_flushed() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: {not json}\n");
        decoder.push(event("a").trim_end().as_bytes());
        assert_eq!(decoder.finish(), "a");
    }

    #[test]
    fn fences_are_removed() {
        assert_eq!(strip_code_fence("```tsx\nexport default function A() {}\n```"), "export default function A() {}");
        assert_eq!(strip_code_fence("```\nconst x = 1;\n```\n"), "const x = 1;");
        assert_eq!(strip_code_fence("function A() {}"), "function A() {}");
    }

    #[test]
    fn image_requests_use_the_vision_model() {
        let mut request = CompletionRequest {
            system_prompt: "sys".into(),
            user_prompt: "user".into(),
            image: None,
        };
        let body = V0Client::request_body(&request);
        assert_eq!(body["model"], TEXT_MODEL);
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["stream"], true);

        request.image = Some("data:image/png;base64,AAAA".into());
        let body = V0Client::request_body(&request);
        assert_eq!(body["model"], VISION_MODEL);
        assert_eq!(body["messages"][1]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
