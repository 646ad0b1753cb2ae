pub mod artifact;
pub mod config;
pub mod error;
pub mod generation;
pub mod html;
pub mod markup;
pub mod response;
pub mod segment;
pub mod source;
pub mod speech;

pub use artifact::{ArtifactKind, ArtifactSession, GenerationEvent, SanitizedArtifact};
pub use config::{ApiKey, AppConfig};
pub use error::DomainError;
pub use generation::{GenerationRequest, ModelEndpoint, SamplingConfig};
pub use source::{SourceDocument, SourceInput, SourceOrigin};
pub use speech::{EngineEvent, SpeechEvent, SpeechSession, SpeechState, Utterance, VoiceInfo};
