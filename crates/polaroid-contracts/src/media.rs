use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(data: &str) -> anyhow::Result<Vec<u8>> {
    BASE64
        .decode(data.trim().as_bytes())
        .context("invalid base64 payload")
}

/// Builds a `data:<mime>;base64,<payload>` URI from an already encoded payload.
pub fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("{DATA_URI_PREFIX}{mime_type}{BASE64_MARKER}{base64_data}")
}

/// Splits a base64 data URI into its mime type and payload without decoding.
pub fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.trim().strip_prefix(DATA_URI_PREFIX)?;
    let (mime, payload) = rest.split_once(BASE64_MARKER)?;
    Some((mime, payload))
}

pub fn decode_data_uri(uri: &str) -> anyhow::Result<(String, Vec<u8>)> {
    let Some((mime, payload)) = split_data_uri(uri) else {
        bail!("not a base64 data URI");
    };
    Ok((mime.to_string(), decode_base64(payload)?))
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.trim().to_ascii_lowercase().starts_with("image/")
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// File name offered when a generated image is saved: `polaroid-<label>.png`
/// with the label lower-cased and every whitespace run replaced by `-`.
pub fn download_filename(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut in_whitespace = false;
    for ch in label.to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        slug.push(ch);
    }
    format!("polaroid-{slug}.png")
}

/// Replaces inline image payloads with a placeholder so request and response
/// bodies can be written to the event log.
pub fn redact_inline_data(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(redact_inline_data).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                if key == "data" && row.is_string() {
                    let len = row.as_str().map(str::len).unwrap_or_default();
                    out.insert(key.clone(), Value::String(format!("<omitted {len} chars>")));
                    continue;
                }
                out.insert(key.clone(), redact_inline_data(row));
            }
            Value::Object(out)
        }
    }
}
