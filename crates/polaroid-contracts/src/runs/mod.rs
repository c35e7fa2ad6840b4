pub mod state;
pub mod summary;

pub use state::{
    GeneratedImage, GenerationItem, ItemStatus, RunAction, RunState, SIMULATED_PROGRESS_CAP,
};
pub use summary::{read_summary, write_summary, RunOutcome, RunSummary, SummaryImage};
