use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, PROMPT_ARG_COMMANDS, SLOT_COMMANDS,
};

/// One parsed line of the interactive session.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        // A bare prompt id toggles it, which keeps the loop quick to drive.
        return Intent::new("toggle_prompt", text)
            .with_arg("id", Value::String(raw_trimmed.to_ascii_lowercase()));
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return Intent::new("unknown", text)
            .with_arg("command", Value::String(String::new()));
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(spec) = SLOT_COMMANDS.iter().find(|spec| spec.command == command) {
        return Intent::new("set_image", text)
            .with_arg("slot", Value::String(spec.slot.as_str().to_string()))
            .with_arg("path", Value::String(parse_single_path_arg(arg)));
    }

    if let Some(action) = find_action(&command, PROMPT_ARG_COMMANDS) {
        return Intent::new(action, text)
            .with_arg("id", Value::String(arg.to_ascii_lowercase()));
    }

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return Intent::new(action, text);
    }

    Intent::new("unknown", text)
        .with_arg("command", Value::String(command))
        .with_arg("arg", Value::String(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn parse_image_slot_with_quoted_path() {
        let intent = parse_intent("/image2 \"/tmp/my photos/b.png\"");
        assert_eq!(intent.action, "set_image");
        assert_eq!(intent.command_args["slot"], json!("image2"));
        assert_eq!(intent.arg_str("path"), Some("/tmp/my photos/b.png"));
    }

    #[test]
    fn parse_image_slot_without_path_has_empty_arg() {
        let intent = parse_intent("/image1");
        assert_eq!(intent.action, "set_image");
        assert_eq!(intent.arg_str("path"), None);
    }

    #[test]
    fn parse_toggle_forms() {
        let intent = parse_intent("/toggle High-Five");
        assert_eq!(intent.action, "toggle_prompt");
        assert_eq!(intent.arg_str("id"), Some("high-five"));

        let short = parse_intent("/t hug");
        assert_eq!(short.action, "toggle_prompt");
        assert_eq!(short.arg_str("id"), Some("hug"));

        let bare = parse_intent("  portrait ");
        assert_eq!(bare.action, "toggle_prompt");
        assert_eq!(bare.arg_str("id"), Some("portrait"));
    }

    #[test]
    fn parse_no_arg_commands_case_insensitive() {
        assert_eq!(parse_intent("/GENERATE").action, "generate");
        assert_eq!(parse_intent("/reset").action, "reset");
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("/prompts").action, "list_prompts");
    }

    #[test]
    fn parse_blank_and_unknown() {
        assert_eq!(parse_intent("   ").action, "noop");
        let unknown = parse_intent("/dance now");
        assert_eq!(unknown.action, "unknown");
        assert_eq!(unknown.command_args["command"], json!("dance"));
        assert_eq!(unknown.command_args["arg"], json!("now"));
        assert_eq!(parse_intent("/ x").action, "unknown");
    }
}
