pub mod config;
pub mod error;
pub mod ticker;
pub mod transport;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{Context, Result};
use polaroid_contracts::events::{EventPayload, EventWriter};
use polaroid_contracts::media::{encode_base64, redact_inline_data};
use polaroid_contracts::prompts::PromptOption;
use polaroid_contracts::runs::{
    write_summary, GeneratedImage, GenerationItem, RunAction, RunOutcome, RunSummary,
    SummaryImage,
};
use polaroid_contracts::uploads::{ImageFile, PromptSelection, Slot, UploadState};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub use config::{ConfigSource, EngineConfig, FailurePolicy};
pub use error::{error_chain_text, GenerateError, MissingInput, GENERIC_FAILURE_MESSAGE};
pub use ticker::{ProgressTicker, TickerGuard};
pub use transport::{
    build_payload, default_transport_registry, extract_image, DryrunTransport, GeminiTransport,
    HttpReply, ImageTransport, InlineImage, TransportRegistry,
};

const ERROR_LOG_MAX_CHARS: usize = 2000;
const HTTP_BODY_MAX_CHARS: usize = 512;

/// Sending half of the run's message stream. Sends after the receiver is
/// gone are dropped; a run never fails because nobody is watching.
#[derive(Debug, Clone)]
pub struct RunDispatch {
    sender: Option<mpsc::Sender<RunAction>>,
}

impl RunDispatch {
    pub fn channel() -> (Self, mpsc::Receiver<RunAction>) {
        let (tx, rx) = mpsc::channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn detached() -> Self {
        Self { sender: None }
    }

    pub fn send(&self, action: RunAction) {
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(action);
        }
    }
}

/// Everything one generation run produced, including images finished before
/// a failure stopped it.
#[derive(Debug)]
pub struct RunReport {
    pub generation_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub selected: Vec<String>,
    pub images: Vec<GeneratedImage>,
    pub error: Option<GenerateError>,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.error.is_some() {
            RunOutcome::Failed
        } else if self.images.len() == self.selected.len() {
            RunOutcome::Completed
        } else {
            RunOutcome::Partial
        }
    }

    pub fn into_result(self) -> Result<Vec<GeneratedImage>, GenerateError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.images),
        }
    }
}

pub struct PolaroidEngine {
    run_dir: PathBuf,
    events: EventWriter,
    config: EngineConfig,
    transport: Box<dyn ImageTransport>,
    ticker: ProgressTicker,
}

impl PolaroidEngine {
    pub fn new(
        run_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        config: EngineConfig,
        provider: &str,
    ) -> Result<Self> {
        let transport = default_transport_registry().build(provider, &config)?;
        Self::with_transport(run_dir, events_path, config, transport)
    }

    pub fn with_transport(
        run_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        config: EngineConfig,
        transport: Box<dyn ImageTransport>,
    ) -> Result<Self> {
        let run_dir = run_dir.into();
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create {}", run_dir.display()))?;
        let run_id = run_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("polaroid-run")
            .to_string();
        let events = EventWriter::new(events_path.into(), run_id);
        events.emit(
            "run_started",
            map_object(json!({
                "out_dir": run_dir.to_string_lossy().to_string(),
                "provider": transport.name(),
                "model": config.model,
                "failure_policy": config.failure_policy.as_str(),
            })),
        )?;

        Ok(Self {
            run_dir,
            events,
            ticker: ProgressTicker::new(config.tick_interval),
            config,
            transport,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &str {
        self.transport.name()
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.config.failure_policy = policy;
    }

    /// One image per selected prompt, in selection order.
    pub fn generate(
        &self,
        uploads: &UploadState,
        selection: &PromptSelection,
        dispatch: &RunDispatch,
    ) -> Result<Vec<GeneratedImage>, GenerateError> {
        self.run(uploads, selection, dispatch).into_result()
    }

    /// Runs every selected prompt strictly one after another and reports
    /// the outcome. State changes go out through `dispatch` as they happen.
    pub fn run(
        &self,
        uploads: &UploadState,
        selection: &PromptSelection,
        dispatch: &RunDispatch,
    ) -> RunReport {
        let mut report = RunReport {
            generation_id: Uuid::new_v4().to_string(),
            started_at: now_utc_iso(),
            finished_at: String::new(),
            selected: selection.ids().map(str::to_string).collect(),
            images: Vec::new(),
            error: None,
        };

        let prompts = selection.resolve();
        let checked = Self::check_inputs(uploads, &prompts)
            .and_then(|files| {
                self.transport
                    .check_ready()
                    .map_err(|err| GenerateError::Config(format!("{err:#}")))?;
                Ok(files)
            });
        let (first, second) = match checked {
            Ok(files) => files,
            Err(err) => {
                self.log(
                    "generation_rejected",
                    json!({
                        "generation_id": report.generation_id,
                        "reason": err.to_string(),
                    }),
                );
                dispatch.send(RunAction::Rejected {
                    message: err.user_message(),
                });
                report.finished_at = now_utc_iso();
                report.error = Some(err);
                return report;
            }
        };

        dispatch.send(RunAction::Started {
            items: prompts.iter().map(|option| GenerationItem::pending(option)).collect(),
        });
        self.log(
            "generation_started",
            json!({
                "generation_id": report.generation_id,
                "selected": report.selected,
                "provider": self.transport.name(),
                "model": self.config.model,
            }),
        );

        let outcome = self.run_prompts(&report.generation_id, &prompts, first, second, dispatch);
        report.finished_at = now_utc_iso();
        match outcome {
            Ok(images) => {
                report.images = images;
                dispatch.send(RunAction::Finished);
                self.log(
                    "generation_finished",
                    json!({
                        "generation_id": report.generation_id,
                        "images": report.images.len(),
                        "selected": report.selected.len(),
                    }),
                );
            }
            Err((images, err)) => {
                report.images = images;
                self.log(
                    "generation_failed",
                    json!({
                        "generation_id": report.generation_id,
                        "error": error_chain_text(&err, ERROR_LOG_MAX_CHARS),
                        "http_status": err.http_status(),
                        "images_before_failure": report.images.len(),
                    }),
                );
                dispatch.send(RunAction::Aborted {
                    message: err.user_message(),
                });
                report.error = Some(err);
            }
        }
        report
    }

    /// Saves every image under its download file name and writes
    /// `summary.json` for the run into the run directory.
    pub fn save_run(&self, report: &RunReport) -> Result<RunSummary> {
        self.save_run_in(&self.run_dir, report)
    }

    /// Like [`Self::save_run`], into `dir`. Sessions give every generation
    /// its own directory so a summary only sits next to its own images.
    pub fn save_run_in(&self, dir: &Path, report: &RunReport) -> Result<RunSummary> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let mut images = Vec::new();
        for image in &report.images {
            let file = image.download_filename();
            let path = dir.join(&file);
            let bytes = image
                .bytes()
                .with_context(|| format!("image for '{}' is not valid base64", image.label))?;
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            images.push(SummaryImage {
                prompt_id: image.prompt_id.clone(),
                label: image.label.clone(),
                mime_type: image.mime_type.clone(),
                file,
            });
        }

        let summary = RunSummary {
            run_id: report.generation_id.clone(),
            started_at: report.started_at.clone(),
            finished_at: report.finished_at.clone(),
            provider: self.transport.name().to_string(),
            model: self.config.model.clone(),
            selected: report.selected.clone(),
            outcome: report.outcome(),
            error: report
                .error
                .as_ref()
                .map(|err| error_chain_text(err, ERROR_LOG_MAX_CHARS)),
            images,
        };
        write_summary(&dir.join("summary.json"), &summary, None)?;
        self.log(
            "run_saved",
            json!({
                "generation_id": summary.run_id,
                "dir": dir.to_string_lossy().to_string(),
                "outcome": summary.outcome,
                "files": summary.images.iter().map(|image| image.file.clone()).collect::<Vec<_>>(),
            }),
        );
        Ok(summary)
    }

    fn check_inputs<'a>(
        uploads: &'a UploadState,
        prompts: &[&'static PromptOption],
    ) -> Result<(&'a ImageFile, &'a ImageFile), GenerateError> {
        let Some(files) = uploads.pair() else {
            return Err(MissingInput::Images.into());
        };
        if prompts.is_empty() {
            return Err(MissingInput::Prompts.into());
        }
        Ok(files)
    }

    fn run_prompts(
        &self,
        generation_id: &str,
        prompts: &[&'static PromptOption],
        first: &ImageFile,
        second: &ImageFile,
        dispatch: &RunDispatch,
    ) -> Result<Vec<GeneratedImage>, (Vec<GeneratedImage>, GenerateError)> {
        let mut images = Vec::with_capacity(prompts.len());
        let first = encode_image_file(Slot::First, first).map_err(|err| (Vec::new(), err))?;
        let second = encode_image_file(Slot::Second, second).map_err(|err| (Vec::new(), err))?;

        for (index, option) in prompts.iter().enumerate() {
            dispatch.send(RunAction::ItemGenerating { index });
            let payload = build_payload(option.prompt, &first, &second);
            self.log(
                "item_started",
                json!({
                    "generation_id": generation_id,
                    "index": index,
                    "prompt_id": option.id,
                    "request": redact_inline_data(&payload),
                }),
            );

            let ticker = self.ticker.start(index, dispatch.clone());
            let outcome = self.request_image(option, &payload);
            ticker.stop();

            match outcome {
                Ok(image) => {
                    self.log(
                        "item_completed",
                        json!({
                            "generation_id": generation_id,
                            "index": index,
                            "prompt_id": option.id,
                            "mime_type": image.mime_type,
                            "data_chars": image.data.len(),
                        }),
                    );
                    dispatch.send(RunAction::ItemCompleted {
                        index,
                        image: image.clone(),
                    });
                    images.push(image);
                }
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::AbortRun => return Err((images, err)),
                    FailurePolicy::ContinueOnFailure => {
                        self.log(
                            "item_failed",
                            json!({
                                "generation_id": generation_id,
                                "index": index,
                                "prompt_id": option.id,
                                "error": error_chain_text(&err, ERROR_LOG_MAX_CHARS),
                                "http_status": err.http_status(),
                            }),
                        );
                        dispatch.send(RunAction::ItemFailed {
                            index,
                            message: err.to_string(),
                        });
                    }
                },
            }
        }
        Ok(images)
    }

    fn request_image(
        &self,
        option: &PromptOption,
        payload: &Value,
    ) -> Result<GeneratedImage, GenerateError> {
        let reply = self
            .transport
            .send(&self.config.model, payload)
            .map_err(|source| GenerateError::Transport {
                prompt: option.label.to_string(),
                source,
            })?;
        if !reply.is_success() {
            return Err(GenerateError::Http {
                prompt: option.label.to_string(),
                status: reply.status,
                body: error::truncate_text(&reply.body, HTTP_BODY_MAX_CHARS),
            });
        }
        let parsed: Value =
            serde_json::from_str(&reply.body).map_err(|source| GenerateError::InvalidResponse {
                prompt: option.label.to_string(),
                source,
            })?;
        let Some(inline) = extract_image(&parsed) else {
            return Err(GenerateError::NoImage {
                label: option.label.to_string(),
            });
        };
        Ok(GeneratedImage {
            prompt_id: option.id.to_string(),
            label: option.label.to_string(),
            mime_type: inline.mime_type,
            data: inline.data,
        })
    }

    fn log(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.events.emit(event_type, map_object(payload)) {
            eprintln!("polaroid: event log write failed: {err:#}");
        }
    }
}

/// Reads a picked file and base64-encodes it with the slot's mime type.
pub fn encode_image_file(slot: Slot, file: &ImageFile) -> Result<InlineImage, GenerateError> {
    let bytes = fs::read(file.path()).map_err(|source| GenerateError::ReadImage {
        slot,
        path: file.path().to_path_buf(),
        source,
    })?;
    Ok(InlineImage {
        mime_type: file.mime_type().to_string(),
        data: encode_base64(&bytes),
    })
}

fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
