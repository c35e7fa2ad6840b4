use std::path::PathBuf;

use polaroid_contracts::uploads::Slot;
use thiserror::Error;

/// Shown to the user for every failure that is not a missing-input rejection.
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred during generation. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MissingInput {
    #[error("Please upload two images to continue.")]
    Images,
    #[error("Please select at least one prompt to generate.")]
    Prompts,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    MissingInput(#[from] MissingInput),

    #[error("provider not ready: {0}")]
    Config(String),

    #[error("failed reading {slot} image {}", path.display())]
    ReadImage {
        slot: Slot,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request for prompt '{prompt}' failed")]
    Transport {
        prompt: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("API response failed. Status: {status}")]
    Http {
        prompt: String,
        status: u16,
        body: String,
    },

    #[error("invalid response payload for prompt '{prompt}'")]
    InvalidResponse {
        prompt: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No image returned for prompt: {label}")]
    NoImage { label: String },
}

impl GenerateError {
    pub fn is_missing_input(&self) -> bool {
        matches!(self, GenerateError::MissingInput(_))
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            GenerateError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The message the presenter shows; everything but missing input
    /// collapses into one generic sentence.
    pub fn user_message(&self) -> String {
        match self {
            GenerateError::MissingInput(missing) => missing.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// `error | caused by: source | ...` with repeated messages dropped.
pub fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty()
            && !parts
                .last()
                .map(|existing| existing == trimmed)
                .unwrap_or(false)
        {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use polaroid_contracts::uploads::Slot;

    use super::{
        error_chain_text, truncate_text, GenerateError, MissingInput, GENERIC_FAILURE_MESSAGE,
    };

    #[test]
    fn missing_input_keeps_its_own_message() {
        let err = GenerateError::from(MissingInput::Images);
        assert!(err.is_missing_input());
        assert_eq!(err.user_message(), "Please upload two images to continue.");
        assert_eq!(
            GenerateError::from(MissingInput::Prompts).to_string(),
            "Please select at least one prompt to generate."
        );
    }

    #[test]
    fn other_failures_collapse_to_generic_message() {
        let err = GenerateError::Http {
            prompt: "Hug".to_string(),
            status: 500,
            body: "oops".to_string(),
        };
        assert_eq!(err.http_status(), Some(500));
        assert_eq!(err.to_string(), "API response failed. Status: 500");
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);

        let err = GenerateError::NoImage {
            label: "High Five".to_string(),
        };
        assert_eq!(err.to_string(), "No image returned for prompt: High Five");
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn error_chain_text_includes_sources() {
        let err = GenerateError::ReadImage {
            slot: Slot::Second,
            path: PathBuf::from("/tmp/b.png"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(
            error_chain_text(&err, 200),
            "failed reading image2 image /tmp/b.png | caused by: no such file"
        );
        assert_eq!(error_chain_text(&err, 7), "failed …");
    }

    #[test]
    fn truncate_text_is_char_aware() {
        assert_eq!(truncate_text("héllo", 10), "héllo");
        assert_eq!(truncate_text("héllo", 2), "hé…");
    }
}
