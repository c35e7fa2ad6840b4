pub mod chat;
pub mod events;
pub mod media;
pub mod prompts;
pub mod runs;
pub mod uploads;
