use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_PROGRESS_TICK_MS: u64 = 200;

const API_KEY_VARS: &[&str] = &[
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "NEXT_PUBLIC_GOOGLE_API_KEY",
];
const DOTENV_FILES: &[&str] = &[".env", ".env.local"];

/// What happens to the rest of a run when one prompt fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure; later prompts are never requested.
    #[default]
    AbortRun,
    /// Mark the item failed and move on to the next prompt.
    ContinueOnFailure,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::AbortRun => "abort_run",
            FailurePolicy::ContinueOnFailure => "continue_on_failure",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" | "abort_run" => Some(FailurePolicy::AbortRun),
            "continue" | "continue_on_failure" => Some(FailurePolicy::ContinueOnFailure),
            _ => None,
        }
    }
}

/// Key/value lookup over the process environment layered on dotenv files.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    vars: HashMap<String, String>,
}

impl ConfigSource {
    /// `.env`, then `.env.local`, then the process environment; later layers win.
    pub fn from_process(dir: &Path) -> Self {
        let mut vars = HashMap::new();
        for name in DOTENV_FILES {
            vars.extend(parse_dotenv(&dir.join(name)));
        }
        vars.extend(env::vars());
        Self { vars }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub tick_interval: Duration,
    /// `None` keeps the HTTP client's own default.
    pub request_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            tick_interval: Duration::from_millis(DEFAULT_PROGRESS_TICK_MS),
            request_timeout: None,
            failure_policy: FailurePolicy::AbortRun,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| ".".into());
        Self::from_source(&ConfigSource::from_process(&cwd))
    }

    pub fn from_source(source: &ConfigSource) -> Self {
        let defaults = Self::default();
        let api_base = source
            .get("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.api_base);
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|key| source.get(key))
            .map(str::to_string);
        let model = source
            .get("POLAROID_MODEL")
            .map(str::to_string)
            .unwrap_or(defaults.model);
        let tick_interval = source
            .get("POLAROID_PROGRESS_TICK_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);
        let request_timeout = source
            .get("POLAROID_REQUEST_TIMEOUT_S")
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(Duration::from_secs_f64);
        let failure_policy = source
            .get("POLAROID_FAILURE_POLICY")
            .and_then(FailurePolicy::parse)
            .unwrap_or_default();

        Self {
            api_base,
            api_key,
            model,
            tick_interval,
            request_timeout,
            failure_policy,
        }
    }
}

/// Parses `KEY=value` lines; `export` prefixes, comments and matching
/// quotes are tolerated. A missing file yields an empty map.
pub fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim().to_string();
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            {
                value = value[1..value.len() - 1].to_string();
            }
        }
        vars.insert(key.to_string(), value);
    }
    vars
}
