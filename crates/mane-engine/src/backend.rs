use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use mane_contracts::error::EngineError;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::adapter::BackendRequest;

/// Seam between the pipeline and the network. The two call families match
/// the two external interfaces: vision chat completions and dedicated
/// image-generation endpoints.
pub trait Backend: Send + Sync {
    fn chat(&self, payload: &Value) -> Result<Value, EngineError>;
    fn generate(&self, request: &BackendRequest) -> Result<Value, EngineError>;
}

/// Blocking HTTP transport. Every call carries a bounded client-side
/// timeout; there is no retry loop here, retry policy belongs to callers.
pub struct HttpBackend {
    http: HttpClient,
    chat_endpoint: String,
    chat_api_key: String,
    generation_api_key: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        chat_api_base: &str,
        chat_api_key: impl Into<String>,
        generation_api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: HttpClient::new(),
            chat_endpoint: format!("{}/chat/completions", chat_api_base.trim_end_matches('/')),
            chat_api_key: chat_api_key.into(),
            generation_api_key: generation_api_key.into(),
            timeout,
        }
    }
}

impl Backend for HttpBackend {
    fn chat(&self, payload: &Value) -> Result<Value, EngineError> {
        let response = self
            .http
            .post(&self.chat_endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.chat_api_key))
            .timeout(self.timeout)
            .json(payload)
            .send()
            .map_err(|err| transport_failure("chat", &err))?;
        response_json_or_error("chat", response)
    }

    fn generate(&self, request: &BackendRequest) -> Result<Value, EngineError> {
        let response = self
            .http
            .post(&request.endpoint)
            .header(AUTHORIZATION, format!("Key {}", self.generation_api_key))
            .timeout(self.timeout)
            .json(&Value::Object(request.payload.clone()))
            .send()
            .map_err(|err| transport_failure("generation", &err))?;
        response_json_or_error("generation", response)
    }
}

fn transport_failure(backend: &str, err: &reqwest::Error) -> EngineError {
    let detail = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    EngineError::network(backend, err.status().map(|status| status.as_u16()), detail)
}

/// Reads the body once, surfacing non-2xx responses as `NetworkFailure`
/// carrying the provider's error payload for diagnostics.
fn response_json_or_error(backend: &str, response: HttpResponse) -> Result<Value, EngineError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| EngineError::network(backend, Some(code), err.to_string()))?;
    if !status.is_success() {
        return Err(EngineError::network(
            backend,
            Some(code),
            truncate_text(&body, 512),
        ));
    }
    serde_json::from_str(&body).map_err(|_| {
        EngineError::network(backend, Some(code), "backend returned invalid JSON payload")
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

/// Offline backend: answers chat calls with canned strict-JSON replies and
/// generation calls with a synthetic solid-color PNG derived from the prompt,
/// wrapped in the dedicated-backend response shape so the extractor and the
/// rest of the pipeline run exactly as they would against the network.
pub struct DryrunBackend;

impl Backend for DryrunBackend {
    fn chat(&self, payload: &Value) -> Result<Value, EngineError> {
        let prompt = first_text_part(payload).unwrap_or_default();
        let reply = if prompt.contains("feasibility") {
            r#"Here is my assessment: {"is_realistic":true,"feasibility_score":8,"reasoning":"dryrun assessment","required_treatments":[],"recommended_products":[],"estimated_time":"1 hour"}"#
        } else {
            r#"{"texture":"straight","density":"medium","condition":"healthy","quality_score":7,"observations":"dryrun analysis","recommendations":["regular trims"]}"#
        };
        Ok(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        }))
    }

    fn generate(&self, request: &BackendRequest) -> Result<Value, EngineError> {
        let prompt = request
            .payload
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let bytes = render_placeholder(prompt, 64, 64)?;
        Ok(json!({
            "data": {
                "images": [{
                    "url": format!("data:image/png;base64,{}", BASE64.encode(bytes)),
                    "width": 64,
                    "height": 64,
                    "content_type": "image/png",
                }]
            }
        }))
    }
}

fn first_text_part(payload: &Value) -> Option<&str> {
    payload
        .pointer("/messages/0/content")?
        .as_array()?
        .iter()
        .find(|part| part.get("type").and_then(Value::as_str) == Some("text"))?
        .get("text")?
        .as_str()
}

fn render_placeholder(prompt: &str, width: u32, height: u32) -> Result<Vec<u8>, EngineError> {
    let (r, g, b) = color_from_prompt(prompt);
    let mut canvas = RgbImage::new(width, height);
    for pixel in canvas.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Cursor::new(Vec::new());
    canvas
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|err| EngineError::network("dryrun", None, err.to_string()))?;
    Ok(bytes.into_inner())
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

pub fn stable_hash(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
