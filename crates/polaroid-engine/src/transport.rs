use std::collections::BTreeMap;
use std::io::Cursor;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use polaroid_contracts::media::{encode_base64, is_image_mime};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;

/// Raw HTTP outcome of one generation request. Status handling belongs to
/// the orchestrator so every transport fails the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A base64 image ready to be embedded in a request or shown as a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

pub trait ImageTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Fails when the transport cannot send anything, before a run starts.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    fn send(&self, model: &str, payload: &Value) -> Result<HttpReply>;
}

type TransportFactory = fn(&EngineConfig) -> Box<dyn ImageTransport>;

#[derive(Default)]
pub struct TransportRegistry {
    factories: BTreeMap<&'static str, TransportFactory>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        self.factories.insert(name, factory);
    }

    pub fn build(&self, name: &str, config: &EngineConfig) -> Result<Box<dyn ImageTransport>> {
        let normalized = name.trim().to_ascii_lowercase();
        let Some(factory) = self.factories.get(normalized.as_str()) else {
            bail!(
                "unknown provider '{name}' (available: {})",
                self.names().join(", ")
            );
        };
        Ok(factory(config))
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().map(|name| name.to_string()).collect()
    }
}

pub fn default_transport_registry() -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    registry.register("gemini", gemini_transport);
    registry.register("dryrun", dryrun_transport);
    registry
}

fn gemini_transport(config: &EngineConfig) -> Box<dyn ImageTransport> {
    Box::new(GeminiTransport::new(config))
}

fn dryrun_transport(_config: &EngineConfig) -> Box<dyn ImageTransport> {
    Box::new(DryrunTransport::default())
}

/// `{ contents: [{ parts: [text, image, image] }], generationConfig }`.
pub fn build_payload(prompt: &str, first: &InlineImage, second: &InlineImage) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inlineData": { "mimeType": first.mime_type, "data": first.data } },
                { "inlineData": { "mimeType": second.mime_type, "data": second.data } },
            ]
        }],
        "generationConfig": { "responseModalities": ["IMAGE"] },
    })
}

/// First part of the first candidate that carries image data.
pub fn extract_image(response: &Value) -> Option<InlineImage> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)?
        .first()?
        .get("content")?
        .get("parts")
        .and_then(Value::as_array)?;

    parts.iter().find_map(|part| {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)?;
        if !is_image_mime(mime_type) {
            return None;
        }
        let data = inline.get("data").and_then(Value::as_str)?;
        Some(InlineImage {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    })
}

/// Text of the first `text` part of a request payload.
pub fn payload_prompt(payload: &Value) -> Option<&str> {
    payload
        .pointer("/contents/0/parts")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
}

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiTransport {
    api_base: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
    http: HttpClient,
}

impl GeminiTransport {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl ImageTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn check_ready(&self) -> Result<()> {
        if self.api_key.is_none() {
            bail!("GEMINI_API_KEY, GOOGLE_API_KEY or NEXT_PUBLIC_GOOGLE_API_KEY not set");
        }
        Ok(())
    }

    fn send(&self, model: &str, payload: &Value) -> Result<HttpReply> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("Gemini API key missing");
        };
        let endpoint = self.endpoint_for_model(model);
        let mut request = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        // Errors are logged and saved with the run; keep request URLs out of them.
        let response = request
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(reqwest::Error::without_url)
            .context("Gemini response body read failed")?;
        Ok(HttpReply { status, body })
    }
}

/// Offline transport: answers every request with a solid-colour PNG whose
/// colour is derived from the prompt, wrapped in a Gemini-shaped response.
pub struct DryrunTransport {
    width: u32,
    height: u32,
    latency: Duration,
}

impl Default for DryrunTransport {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            latency: Duration::from_millis(800),
        }
    }
}

impl DryrunTransport {
    pub fn new(width: u32, height: u32, latency: Duration) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            latency,
        }
    }
}

impl ImageTransport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn send(&self, model: &str, payload: &Value) -> Result<HttpReply> {
        let prompt = payload_prompt(payload).unwrap_or_default();
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let png = render_dryrun_png(self.width, self.height, prompt)?;
        let body = json!({
            "responseId": short_id(prompt),
            "modelVersion": model,
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": format!("dryrun render for: {prompt}") },
                        { "inlineData": { "mimeType": "image/png", "data": encode_base64(&png) } },
                    ]
                },
                "finishReason": "STOP",
            }],
        });
        Ok(HttpReply {
            status: 200,
            body: serde_json::to_string(&body)?,
        })
    }
}

fn render_dryrun_png(width: u32, height: u32, prompt: &str) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(prompt);
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .context("dryrun png encode failed")?;
    Ok(out.into_inner())
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..4])
}
