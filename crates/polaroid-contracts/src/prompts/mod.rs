mod catalog;

pub use catalog::{find_prompt, prompt_ids, PromptOption, PROMPT_OPTIONS};
