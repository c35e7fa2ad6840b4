use serde::{Deserialize, Serialize};

use crate::media::{data_uri, decode_base64, download_filename};
use crate::prompts::PromptOption;

/// Ceiling for simulated progress; only a completed item reaches 100.
pub const SIMULATED_PROGRESS_CAP: f64 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Generating => "generating",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Pending => "Waiting to start",
            ItemStatus::Generating => "Creating polaroid...",
            ItemStatus::Completed => "Ready!",
            ItemStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// An image returned by the provider, still base64-encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    pub prompt_id: String,
    pub label: String,
    pub mime_type: String,
    pub data: String,
}

impl GeneratedImage {
    pub fn data_uri(&self) -> String {
        data_uri(&self.mime_type, &self.data)
    }

    pub fn bytes(&self) -> anyhow::Result<Vec<u8>> {
        decode_base64(&self.data)
    }

    pub fn download_filename(&self) -> String {
        download_filename(&self.label)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationItem {
    pub prompt_id: String,
    pub label: String,
    pub status: ItemStatus,
    pub progress: f64,
    pub result: Option<GeneratedImage>,
}

impl GenerationItem {
    pub fn pending(option: &PromptOption) -> Self {
        Self {
            prompt_id: option.id.to_string(),
            label: option.label.to_string(),
            status: ItemStatus::Pending,
            progress: 0.0,
            result: None,
        }
    }

    fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.progress = 0.0;
        self.result = None;
    }
}

/// State transitions dispatched by a generation run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunAction {
    Started { items: Vec<GenerationItem> },
    ItemGenerating { index: usize },
    ProgressTick { index: usize, delta: f64 },
    ItemCompleted { index: usize, image: GeneratedImage },
    ItemFailed { index: usize, message: String },
    Finished,
    Aborted { message: String },
    Rejected { message: String },
    Reset,
}

impl RunAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RunAction::Started { .. } => "started",
            RunAction::ItemGenerating { .. } => "item_generating",
            RunAction::ProgressTick { .. } => "progress_tick",
            RunAction::ItemCompleted { .. } => "item_completed",
            RunAction::ItemFailed { .. } => "item_failed",
            RunAction::Finished => "finished",
            RunAction::Aborted { .. } => "aborted",
            RunAction::Rejected { .. } => "rejected",
            RunAction::Reset => "reset",
        }
    }
}

/// Presentation state of the current run. Only `apply` mutates it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunState {
    pub items: Vec<GenerationItem>,
    pub results: Vec<GeneratedImage>,
    pub loading: bool,
    pub error: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: RunAction) {
        match action {
            RunAction::Started { items } => {
                self.items = items;
                self.results.clear();
                self.loading = true;
                self.error = None;
            }
            RunAction::ItemGenerating { index } => {
                if let Some(item) = self.items.get_mut(index) {
                    item.status = ItemStatus::Generating;
                }
            }
            RunAction::ProgressTick { index, delta } => {
                let Some(item) = self.items.get_mut(index) else {
                    return;
                };
                if item.status != ItemStatus::Generating || item.progress >= SIMULATED_PROGRESS_CAP {
                    return;
                }
                item.progress = (item.progress + delta.max(0.0)).min(SIMULATED_PROGRESS_CAP);
            }
            RunAction::ItemCompleted { index, image } => {
                if let Some(item) = self.items.get_mut(index) {
                    item.status = ItemStatus::Completed;
                    item.progress = 100.0;
                    item.result = Some(image.clone());
                }
                self.results.push(image);
            }
            RunAction::ItemFailed { index, .. } => {
                if let Some(item) = self.items.get_mut(index) {
                    item.status = ItemStatus::Failed;
                }
            }
            RunAction::Finished => {
                self.loading = false;
            }
            RunAction::Aborted { message } => {
                self.loading = false;
                self.error = Some(message);
                for item in &mut self.items {
                    item.reset();
                }
            }
            RunAction::Rejected { message } => {
                self.error = Some(message);
            }
            RunAction::Reset => {
                *self = RunState::default();
            }
        }
    }

    pub fn item(&self, index: usize) -> Option<&GenerationItem> {
        self.items.get(index)
    }

    /// The final gallery is only shown for a finished run that produced one
    /// image per selected prompt.
    pub fn gallery_ready(&self, selected: usize) -> bool {
        !self.loading && !self.results.is_empty() && self.results.len() == selected
    }
}
