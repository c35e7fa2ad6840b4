use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::bail;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::media::mime_for_path;
use crate::prompts::{find_prompt, PromptOption};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::First, Slot::Second];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::First => "image1",
            Slot::Second => "image2",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Slot::First => "1st Photo",
            Slot::Second => "2nd Photo",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A picked photo. Bytes stay on disk until a run encodes them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFile {
    path: PathBuf,
    mime_type: String,
}

impl ImageFile {
    /// Accepts only paths with an image extension, like an `image/*` file picker.
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let Some(mime_type) = mime_for_path(&path) else {
            bail!("not an image file: {}", path.display());
        };
        Ok(Self {
            path,
            mime_type: mime_type.to_string(),
        })
    }

    pub fn with_mime_type(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadState {
    file1: Option<ImageFile>,
    file2: Option<ImageFile>,
}

impl UploadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_image(&mut self, slot: Slot, file: Option<ImageFile>) {
        match slot {
            Slot::First => self.file1 = file,
            Slot::Second => self.file2 = file,
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&ImageFile> {
        match slot {
            Slot::First => self.file1.as_ref(),
            Slot::Second => self.file2.as_ref(),
        }
    }

    /// Both photos, or `None` while either slot is empty.
    pub fn pair(&self) -> Option<(&ImageFile, &ImageFile)> {
        Some((self.file1.as_ref()?, self.file2.as_ref()?))
    }

    pub fn is_complete(&self) -> bool {
        self.pair().is_some()
    }
}

/// Selected prompt ids in the order they were picked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptSelection {
    ids: IndexSet<String>,
}

impl PromptSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `id` is selected after the toggle.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.shift_remove(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Catalog entries for the selected ids, in selection order.
    pub fn resolve(&self) -> Vec<&'static PromptOption> {
        self.ids.iter().filter_map(|id| find_prompt(id)).collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for PromptSelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut selection = PromptSelection::new();
        for id in iter {
            let id = id.as_ref();
            if !selection.contains(id) {
                selection.toggle(id);
            }
        }
        selection
    }
}
