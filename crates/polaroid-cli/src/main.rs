mod presenter;

use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use polaroid_contracts::chat::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use polaroid_contracts::prompts::{find_prompt, PROMPT_OPTIONS};
use polaroid_contracts::runs::{ItemStatus, RunAction, RunOutcome, RunState};
use polaroid_contracts::uploads::{ImageFile, PromptSelection, Slot, UploadState};
use polaroid_engine::{EngineConfig, FailurePolicy, PolaroidEngine, RunDispatch, RunReport};
use serde_json::json;

use presenter::{
    gallery_entries_from_summary, render_item_line, thumbnail_summary, write_gallery_html,
    GalleryEntry, ProgressView,
};

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_MISSING_INPUT: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "polaroid", version, about = "Polaroid-style photos from two pictures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the prompt catalog.
    Prompts,
    Generate(GenerateArgs),
    Session(SessionArgs),
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    continue_on_failure: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    image1: Option<PathBuf>,
    #[arg(long)]
    image2: Option<PathBuf>,
    #[arg(long = "prompt")]
    prompts: Vec<String>,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    run: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("polaroid error: {err:#}");
            std::process::exit(EXIT_FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Prompts => {
            for option in PROMPT_OPTIONS {
                println!("{:<10} {}", option.id, option.label);
            }
            Ok(EXIT_OK)
        }
        Command::Generate(args) => run_generate(args),
        Command::Session(args) => {
            run_session(args)?;
            Ok(EXIT_OK)
        }
        Command::Export(args) => run_export(args),
    }
}

fn build_engine(out: &Path, args: &EngineArgs) -> Result<PolaroidEngine> {
    let mut config = EngineConfig::from_env();
    if let Some(model) = args.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        config.model = model.to_string();
    }
    if args.continue_on_failure {
        config.failure_policy = FailurePolicy::ContinueOnFailure;
    }
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| out.join("events.jsonl"));
    PolaroidEngine::new(out, events_path, config, &args.provider)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut uploads = UploadState::new();
    for (slot, path) in [(Slot::First, &args.image1), (Slot::Second, &args.image2)] {
        if let Some(path) = path {
            uploads.set_image(slot, Some(ImageFile::from_path(path)?));
        }
    }
    let mut selection = PromptSelection::new();
    for id in &args.prompts {
        if find_prompt(id).is_none() {
            eprintln!("Unknown prompt: {id}. Run `polaroid prompts` for the catalog.");
            return Ok(EXIT_MISSING_INPUT);
        }
        if !selection.contains(id.trim()) {
            selection.toggle(id.trim());
        }
    }

    let engine = build_engine(&args.out, &args.engine)?;
    let mut state = RunState::new();
    let report = execute_run(&engine, &uploads, &selection, &mut state)?;
    finish_run(&engine, engine.run_dir(), &report, &state, selection.len())
}

/// Runs the engine on a worker thread and folds its actions into `state`
/// here, printing progress as it changes. A rejected run only records its
/// error, so the previous run's items stay in `state`.
fn execute_run(
    engine: &PolaroidEngine,
    uploads: &UploadState,
    selection: &PromptSelection,
    state: &mut RunState,
) -> Result<RunReport> {
    let (dispatch, rx) = RunDispatch::channel();
    thread::scope(|scope| -> Result<RunReport> {
        let worker = thread::Builder::new()
            .name("polaroid-run".to_string())
            .spawn_scoped(scope, move || engine.run(uploads, selection, &dispatch))?;

        let mut view: Option<ProgressView> = None;
        for action in rx {
            if matches!(action, RunAction::Started { .. }) {
                view = Some(ProgressView::default());
            }
            state.apply(action);
            let Some(view) = view.as_mut() else {
                continue;
            };
            if view.is_fresh() {
                println!("Generating {} polaroid(s)...", state.items.len());
            }
            for line in view.changed_lines(state) {
                println!("{line}");
            }
        }

        worker
            .join()
            .map_err(|_| anyhow!("generation worker panicked"))
    })
}

/// Saves the run into `out_dir`, prints the finished items and writes the
/// gallery when every selected prompt produced an image.
fn finish_run(
    engine: &PolaroidEngine,
    out_dir: &Path,
    report: &RunReport,
    state: &RunState,
    selected: usize,
) -> Result<i32> {
    if let Some(message) = failure_message(report, state) {
        eprintln!("{message}");
    }
    if report
        .error
        .as_ref()
        .is_some_and(|err| err.is_missing_input())
    {
        return Ok(EXIT_MISSING_INPUT);
    }

    let summary = engine.save_run_in(out_dir, report)?;
    for (index, item) in state.items.iter().enumerate() {
        if item.status != ItemStatus::Completed {
            continue;
        }
        let Some(image) = item.result.as_ref() else {
            continue;
        };
        let saved = out_dir.join(image.download_filename());
        println!("{}  {}", render_item_line(index, item), thumbnail_summary(image, Some(&saved)));
    }

    if state.gallery_ready(selected) {
        let entries: Vec<GalleryEntry> = state.results.iter().map(GalleryEntry::from_image).collect();
        let gallery_path = out_dir.join("gallery.html");
        write_gallery_html(&gallery_path, &entries)?;
        engine.event_writer().emit(
            "gallery_written",
            json!({
                "path": gallery_path.to_string_lossy().to_string(),
                "images": entries.len(),
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        )?;
        println!("Your polaroids are ready: {}", gallery_path.display());
    }

    Ok(exit_code(report.error.is_some(), summary.outcome))
}

/// The user only sees the collapsed message; the error chain stays in the
/// event log and the summary.
fn failure_message(report: &RunReport, state: &RunState) -> Option<String> {
    report.error.as_ref()?;
    state.error.clone()
}

fn exit_code(failed: bool, outcome: RunOutcome) -> i32 {
    if failed {
        return EXIT_FAILED;
    }
    match outcome {
        RunOutcome::Completed => EXIT_OK,
        RunOutcome::Partial | RunOutcome::Failed => EXIT_FAILED,
    }
}

fn run_export(args: ExportArgs) -> Result<i32> {
    let summary = polaroid_contracts::runs::read_summary(&args.run.join("summary.json"))?;
    let entries = gallery_entries_from_summary(&args.run, &summary)?;
    write_gallery_html(&args.out, &entries)?;
    println!("Exported {} polaroid(s) to {}", entries.len(), args.out.display());
    Ok(EXIT_OK)
}

/// Upload slots, prompt picks and the last run's state for the interactive
/// loop.
#[derive(Debug, Default)]
struct Session {
    uploads: UploadState,
    selection: PromptSelection,
    state: RunState,
}

enum SessionStep {
    Reply(Vec<String>),
    Generate,
    Quit,
}

impl Session {
    fn handle(&mut self, intent: &Intent) -> SessionStep {
        let reply = match intent.action.as_str() {
            "noop" => Vec::new(),
            "help" => vec![format!("Commands: {}", SESSION_HELP_COMMANDS.join(" "))],
            "list_prompts" => PROMPT_OPTIONS
                .iter()
                .map(|option| {
                    let mark = if self.selection.contains(option.id) { "x" } else { " " };
                    format!("[{mark}] {:<10} {}", option.id, option.label)
                })
                .collect(),
            "toggle_prompt" => vec![self.toggle_prompt(intent.arg_str("id"))],
            "set_image" => vec![self.set_image(intent)],
            "status" => self.status_lines(),
            "reset" => {
                self.uploads = UploadState::new();
                self.selection.clear();
                self.state.apply(RunAction::Reset);
                vec!["Session reset.".to_string()]
            }
            "generate" => return SessionStep::Generate,
            "quit" => return SessionStep::Quit,
            _ => {
                let command = intent.arg_str("command").unwrap_or_default();
                vec![format!("Unknown command: /{command}. Type /help for commands.")]
            }
        };
        SessionStep::Reply(reply)
    }

    fn toggle_prompt(&mut self, id: Option<&str>) -> String {
        let Some(id) = id else {
            return "/toggle requires a prompt id".to_string();
        };
        let Some(option) = find_prompt(id) else {
            return format!("Unknown prompt: {id}. Type /prompts to list them.");
        };
        if self.selection.toggle(option.id) {
            format!("Selected {}", option.label)
        } else {
            format!("Deselected {}", option.label)
        }
    }

    fn set_image(&mut self, intent: &Intent) -> String {
        let slot = match intent.arg_str("slot") {
            Some("image2") => Slot::Second,
            _ => Slot::First,
        };
        let Some(path) = intent.arg_str("path") else {
            self.uploads.set_image(slot, None);
            return format!("{} cleared", slot.label());
        };
        let path = PathBuf::from(path);
        if !path.is_file() {
            return format!("{} not set: file not found ({})", slot.label(), path.display());
        }
        match ImageFile::from_path(&path) {
            Ok(file) => {
                let reply = format!("{} set to {} ({})", slot.label(), file.name(), file.mime_type());
                self.uploads.set_image(slot, Some(file));
                reply
            }
            Err(err) => format!("{} not set: {err}", slot.label()),
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for slot in Slot::ALL {
            let value = self
                .uploads
                .get(slot)
                .map(|file| file.path().display().to_string())
                .unwrap_or_else(|| "(none)".to_string());
            lines.push(format!("{}: {value}", slot.label()));
        }
        let selected: Vec<&str> = self.selection.ids().collect();
        lines.push(if selected.is_empty() {
            "Prompts: (none)".to_string()
        } else {
            format!("Prompts: {}", selected.join(", "))
        });
        for (index, item) in self.state.items.iter().enumerate() {
            lines.push(render_item_line(index, item));
        }
        if let Some(error) = self.state.error.as_deref() {
            lines.push(format!("Last error: {error}"));
        }
        lines
    }
}

fn run_session(args: SessionArgs) -> Result<()> {
    let engine = build_engine(&args.out, &args.engine)?;
    let mut session = Session::default();
    let stdin = io::stdin();
    let mut line = String::new();

    println!("Polaroid session started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match session.handle(&intent) {
            SessionStep::Reply(lines) => {
                for reply in lines {
                    println!("{reply}");
                }
            }
            SessionStep::Generate => {
                let report = execute_run(
                    &engine,
                    &session.uploads,
                    &session.selection,
                    &mut session.state,
                )?;
                let out_dir = engine.run_dir().join(&report.generation_id);
                let code = finish_run(
                    &engine,
                    &out_dir,
                    &report,
                    &session.state,
                    session.selection.len(),
                )?;
                if code == EXIT_OK {
                    println!("Done.");
                }
            }
            SessionStep::Quit => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use anyhow::Result;
    use clap::Parser;
    use polaroid_contracts::chat::parse_intent;
    use polaroid_contracts::runs::{RunAction, RunOutcome, RunState};
    use polaroid_contracts::uploads::Slot;
    use polaroid_engine::{DryrunTransport, EngineConfig, GenerateError, PolaroidEngine, RunReport};

    use super::{
        execute_run, exit_code, failure_message, finish_run, Cli, Command, Session, SessionStep,
        EXIT_FAILED, EXIT_MISSING_INPUT, EXIT_OK,
    };

    fn reply(session: &mut Session, line: &str) -> Vec<String> {
        match session.handle(&parse_intent(line)) {
            SessionStep::Reply(lines) => lines,
            SessionStep::Generate => vec!["<generate>".to_string()],
            SessionStep::Quit => vec!["<quit>".to_string()],
        }
    }

    #[test]
    fn generate_args_collect_repeated_prompts() -> Result<()> {
        let cli = Cli::try_parse_from([
            "polaroid",
            "generate",
            "--image1",
            "a.png",
            "--image2",
            "b.jpg",
            "--prompt",
            "hug",
            "--prompt",
            "portrait",
            "--out",
            "out",
            "--provider",
            "dryrun",
            "--continue-on-failure",
        ])?;
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.prompts, vec!["hug", "portrait"]);
        assert_eq!(args.engine.provider, "dryrun");
        assert!(args.engine.continue_on_failure);
        assert!(args.engine.events.is_none());
        Ok(())
    }

    #[test]
    fn exit_codes_follow_outcome() {
        assert_eq!(exit_code(false, RunOutcome::Completed), EXIT_OK);
        assert_eq!(exit_code(false, RunOutcome::Partial), EXIT_FAILED);
        assert_eq!(exit_code(true, RunOutcome::Failed), EXIT_FAILED);
    }

    #[test]
    fn session_toggles_prompts_in_pick_order() {
        let mut session = Session::default();
        assert_eq!(reply(&mut session, "hug"), vec!["Selected Hug"]);
        assert_eq!(reply(&mut session, "/toggle portrait"), vec!["Selected Portrait"]);
        assert_eq!(reply(&mut session, "/t hug"), vec!["Deselected Hug"]);
        assert_eq!(reply(&mut session, "/toggle HUG"), vec!["Selected Hug"]);
        let ids: Vec<&str> = session.selection.ids().collect();
        assert_eq!(ids, vec!["portrait", "hug"]);
        assert!(reply(&mut session, "/toggle disco")[0].starts_with("Unknown prompt: disco"));

        let listing = reply(&mut session, "/prompts");
        assert_eq!(listing.len(), 3);
        assert!(listing.iter().any(|line| line.starts_with("[ ] high-five")));
        assert!(listing.iter().any(|line| line.starts_with("[x] hug")));
    }

    #[test]
    fn session_sets_clears_and_resets_images() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = temp.path().join("me.png");
        fs::write(&photo, b"png")?;
        let mut session = Session::default();

        let set = reply(&mut session, &format!("/image1 {}", photo.display()));
        assert_eq!(set, vec!["1st Photo set to me.png (image/png)"]);
        assert!(session.uploads.get(Slot::First).is_some());

        let missing = reply(&mut session, "/image2 /definitely/not/here.png");
        assert!(missing[0].contains("file not found"));
        assert!(session.uploads.get(Slot::Second).is_none());

        assert_eq!(reply(&mut session, "/image1"), vec!["1st Photo cleared"]);
        assert!(session.uploads.get(Slot::First).is_none());

        reply(&mut session, "portrait");
        assert_eq!(reply(&mut session, "/reset"), vec!["Session reset."]);
        assert!(session.selection.is_empty());
        Ok(())
    }

    #[test]
    fn session_routes_generate_quit_and_unknown() {
        let mut session = Session::default();
        assert_eq!(reply(&mut session, "/generate"), vec!["<generate>"]);
        assert_eq!(reply(&mut session, "/exit"), vec!["<quit>"]);
        assert_eq!(
            reply(&mut session, "/dance"),
            vec!["Unknown command: /dance. Type /help for commands."]
        );
        assert!(reply(&mut session, "   ").is_empty());
        assert!(reply(&mut session, "/help")[0].contains("/image1 <path>"));
        let status = reply(&mut session, "/status");
        assert_eq!(status[0], "1st Photo: (none)");
        assert_eq!(status[2], "Prompts: (none)");
    }

    fn dryrun_engine(run_dir: &std::path::Path) -> Result<PolaroidEngine> {
        let config = EngineConfig {
            tick_interval: Duration::from_millis(1),
            ..EngineConfig::default()
        };
        PolaroidEngine::with_transport(
            run_dir,
            run_dir.join("events.jsonl"),
            config,
            Box::new(DryrunTransport::new(8, 8, Duration::ZERO)),
        )
    }

    #[test]
    fn rejected_generate_keeps_previous_run_in_session() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let first = temp.path().join("a.png");
        let second = temp.path().join("b.png");
        fs::write(&first, b"first")?;
        fs::write(&second, b"second")?;
        let run_dir = temp.path().join("out");
        let engine = dryrun_engine(&run_dir)?;

        let mut session = Session::default();
        reply(&mut session, &format!("/image1 {}", first.display()));
        reply(&mut session, &format!("/image2 {}", second.display()));
        reply(&mut session, "hug");

        let report = execute_run(&engine, &session.uploads, &session.selection, &mut session.state)?;
        assert!(report.error.is_none());
        let out_dir = run_dir.join(&report.generation_id);
        assert_eq!(finish_run(&engine, &out_dir, &report, &session.state, 1)?, EXIT_OK);
        assert!(out_dir.join("gallery.html").exists());
        assert!(out_dir.join("polaroid-hug.png").exists());
        assert!(!run_dir.join("summary.json").exists());

        assert_eq!(reply(&mut session, "hug"), vec!["Deselected Hug"]);
        let rejected =
            execute_run(&engine, &session.uploads, &session.selection, &mut session.state)?;
        let rejected_dir = run_dir.join(&rejected.generation_id);
        assert_eq!(
            finish_run(&engine, &rejected_dir, &rejected, &session.state, 0)?,
            EXIT_MISSING_INPUT
        );
        assert!(!rejected_dir.exists());

        assert_eq!(session.state.items.len(), 1);
        assert_eq!(session.state.results.len(), 1);
        let status = reply(&mut session, "/status");
        assert!(status
            .iter()
            .any(|line| line.contains("Hug") && line.ends_with("Ready!")));
        assert_eq!(
            status.last().map(String::as_str),
            Some("Last error: Please select at least one prompt to generate.")
        );
        Ok(())
    }

    #[test]
    fn failure_message_hides_error_details() {
        let err = GenerateError::Http {
            prompt: "Hug".to_string(),
            status: 500,
            body: "upstream exploded".to_string(),
        };
        let mut state = RunState::new();
        state.apply(RunAction::Aborted {
            message: err.user_message(),
        });
        let report = RunReport {
            generation_id: "gen-1".to_string(),
            started_at: String::new(),
            finished_at: String::new(),
            selected: vec!["hug".to_string()],
            images: Vec::new(),
            error: Some(err),
        };

        let message = failure_message(&report, &state).unwrap_or_default();
        assert_eq!(
            message,
            "An error occurred during generation. Please try again."
        );
        assert!(!message.contains("500"));

        let finished = RunReport { error: None, ..report };
        assert_eq!(failure_message(&finished, &state), None);
    }
}
