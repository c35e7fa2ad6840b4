use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use polaroid_contracts::media::{data_uri, decode_base64, download_filename, encode_base64};
use polaroid_contracts::runs::{GeneratedImage, GenerationItem, ItemStatus, RunState, RunSummary};

const BAR_WIDTH: usize = 20;

pub fn render_progress_bar(progress: f64) -> String {
    let clamped = progress.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled.min(BAR_WIDTH)),
        "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH))
    )
}

pub fn render_item_line(index: usize, item: &GenerationItem) -> String {
    format!(
        "{:>2}. {:<10} {} {:>3}%  {}",
        index + 1,
        item.label,
        render_progress_bar(item.progress),
        item.progress.clamp(0.0, 100.0).round() as u32,
        item.status.label()
    )
}

/// Remembers what was last printed per item so a stream of ticks only
/// produces a line when the status or a 10% step changes.
#[derive(Debug, Default)]
pub struct ProgressView {
    last: Vec<(ItemStatus, u8)>,
}

impl ProgressView {
    /// Nothing printed yet.
    pub fn is_fresh(&self) -> bool {
        self.last.is_empty()
    }

    pub fn changed_lines(&mut self, state: &RunState) -> Vec<String> {
        if self.last.len() != state.items.len() {
            self.last = vec![(ItemStatus::Pending, u8::MAX); state.items.len()];
        }
        let mut lines = Vec::new();
        for (index, item) in state.items.iter().enumerate() {
            let step = (item.progress.clamp(0.0, 100.0) / 10.0).floor() as u8;
            let seen = (item.status, step);
            if self.last[index] != seen {
                self.last[index] = seen;
                lines.push(render_item_line(index, item));
            }
        }
        lines
    }
}

/// `image/png 256x256 -> out/polaroid-hug.png`; dimensions are left out
/// when the bytes do not decode.
pub fn thumbnail_summary(image: &GeneratedImage, saved: Option<&Path>) -> String {
    let mut text = image.mime_type.clone();
    let dimensions = decode_base64(&image.data)
        .ok()
        .and_then(|bytes| image::load_from_memory(&bytes).ok())
        .map(|decoded| format!("{}x{}", decoded.width(), decoded.height()));
    if let Some(dimensions) = dimensions {
        text.push(' ');
        text.push_str(&dimensions);
    }
    if let Some(path) = saved {
        text.push_str(&format!(" -> {}", path.display()));
    }
    text
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub label: String,
    pub file_name: String,
    pub data_uri: String,
}

impl GalleryEntry {
    pub fn from_image(image: &GeneratedImage) -> Self {
        Self {
            label: image.label.clone(),
            file_name: image.download_filename(),
            data_uri: image.data_uri(),
        }
    }
}

/// Rebuilds gallery entries from the images a saved run wrote next to its
/// `summary.json`.
pub fn gallery_entries_from_summary(run_dir: &Path, summary: &RunSummary) -> Result<Vec<GalleryEntry>> {
    let mut entries = Vec::with_capacity(summary.images.len());
    for image in &summary.images {
        let path = run_dir.join(&image.file);
        let bytes = fs::read(&path).with_context(|| format!("failed reading {}", path.display()))?;
        entries.push(GalleryEntry {
            label: image.label.clone(),
            file_name: download_filename(&image.label),
            data_uri: data_uri(&image.mime_type, &encode_base64(&bytes)),
        });
    }
    Ok(entries)
}

pub fn render_gallery_html(entries: &[GalleryEntry]) -> String {
    let mut cards = String::new();
    for entry in entries {
        cards.push_str(&format!(
            "<div class='polaroid'><div class='photo'><img src='{src}' alt='{label}'></div><div class='caption'>{label}</div><a class='download' download='{file}' href='{src}'>Download</a></div>",
            src = escape_html(&entry.data_uri),
            label = escape_html(&entry.label),
            file = escape_html(&entry.file_name),
        ));
    }

    format!(
        "<!doctype html>\n<html>\n<head>\n  <meta charset='utf-8'>\n  <title>Your Polaroids</title>\n  <style>\n    body {{ font-family: Arial, sans-serif; background: #f3efe6; margin: 0; padding: 24px; }}\n    .grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 20px; }}\n    .polaroid {{ background: white; padding: 12px 12px 16px; box-shadow: 0 4px 12px rgba(0,0,0,0.12); }}\n    .photo img {{ width: 100%; display: block; }}\n    .caption {{ margin: 12px 0 8px; font-size: 16px; text-align: center; }}\n    .download {{ display: block; text-align: center; font-size: 13px; color: #0066cc; text-decoration: none; }}\n  </style>\n</head>\n<body>\n  <h1>Your Polaroids</h1>\n  <div class='grid'>\n    {cards}\n  </div>\n</body>\n</html>\n"
    )
}

pub fn write_gallery_html(out_path: &Path, entries: &[GalleryEntry]) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out_path, render_gallery_html(entries))
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    Ok(())
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
