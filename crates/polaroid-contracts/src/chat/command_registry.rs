use crate::uploads::Slot;

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SlotCommandSpec {
    pub command: &'static str,
    pub slot: Slot,
}

pub(crate) const SLOT_COMMANDS: &[SlotCommandSpec] = &[
    SlotCommandSpec {
        command: "image1",
        slot: Slot::First,
    },
    SlotCommandSpec {
        command: "image2",
        slot: Slot::Second,
    },
];

pub(crate) const PROMPT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "toggle",
        action: "toggle_prompt",
    },
    CommandSpec {
        command: "t",
        action: "toggle_prompt",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "prompts",
        action: "list_prompts",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/image1 <path>",
    "/image2 <path>",
    "/toggle <prompt-id>",
    "/prompts",
    "/status",
    "/generate",
    "/reset",
    "/help",
    "/quit",
];
