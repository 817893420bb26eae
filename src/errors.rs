use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Malformed action: {0}")]
    MalformedAction(String),

    #[error("Trajectory error: {0}")]
    Trajectory(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl DeskPilotError {
    /// Short label used when logging a failed prediction attempt.
    pub fn failure_kind(&self) -> &'static str {
        match self {
            DeskPilotError::LlmProvider(_)
            | DeskPilotError::SseParsing(_)
            | DeskPilotError::Http(_) => "transport",
            DeskPilotError::Parse(_) | DeskPilotError::Json(_) => "parse",
            DeskPilotError::MalformedAction(_) => "malformed_action",
            _ => "other",
        }
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;
