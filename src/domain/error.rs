use crate::domain::artifact::ArtifactKind;
use crate::domain::speech::SpeechState;
use thiserror::Error;

/// Domain-level errors for Cogni-Flow.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network request blocked: {reason}")]
    NetworkBlocked { reason: String },

    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Not enough content to work with: {actual} characters (need at least {minimum})")]
    InsufficientContent { actual: usize, minimum: usize },

    #[error("Could not read file {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Could not fetch content from {url} automatically. Please copy and paste the text into the input instead.")]
    UrlFetch { url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Completion response did not contain any generated text")]
    MissingCompletionText,

    #[error("{stage} response too short: {actual} characters (need at least {minimum})")]
    ResponseTooShort {
        stage: &'static str,
        actual: usize,
        minimum: usize,
    },

    #[error("No model endpoints configured")]
    NoEndpoints,

    #[error("Failed to generate {kind}: {cause}")]
    Generation {
        kind: ArtifactKind,
        #[source]
        cause: Box<DomainError>,
    },

    #[error("A generation run is already in progress")]
    GenerationInProgress,

    #[error("Generation cancelled before {kind} was started")]
    GenerationCancelled { kind: ArtifactKind },

    #[error("No {0} generated yet")]
    ArtifactMissing(ArtifactKind),

    #[error("No content to read. Generate some notes first!")]
    NoContent,

    #[error("Nothing readable found in the notes")]
    NoSentences,

    #[error("Invalid speech state transition from {from:?} to {to:?}")]
    SpeechStateTransition { from: SpeechState, to: SpeechState },

    #[error("Speech engine error: {0}")]
    SpeechEngine(String),
}

impl DomainError {
    /// Errors the user can fix by changing what they supplied.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DomainError::InsufficientContent { .. }
                | DomainError::FileRead { .. }
                | DomainError::UrlFetch { .. }
                | DomainError::InvalidUrl(_)
        )
    }

    /// Message suitable for the single user-facing error dialog.
    pub fn user_message(&self) -> String {
        match self {
            DomainError::InsufficientContent { minimum, .. } => format!(
                "Please provide more content to work with (at least {} characters).",
                minimum
            ),
            DomainError::FileRead { .. } => {
                format!("{}. Try pasting the text directly instead.", self)
            }
            DomainError::InvalidUrl(_) => {
                format!("{}. Check the address or paste the text directly.", self)
            }
            DomainError::NoEndpoints => format!(
                "{}. Add model ids to `endpoints` under [model] in config.toml (`cogniflow config --path` shows where it is).",
                self
            ),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
