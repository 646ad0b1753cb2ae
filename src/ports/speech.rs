use tokio::sync::broadcast;

use crate::domain::{DomainError, EngineEvent, Utterance, VoiceInfo};

/// Port for a text-to-speech engine.
///
/// Mirrors the browser speech-synthesis primitives. Completion and errors are
/// reported asynchronously through [`SpeechEngine::subscribe`]; methods must
/// not call back into the caller synchronously.
pub trait SpeechEngine: Send + Sync {
    /// Queue an utterance for speaking.
    fn speak(&self, utterance: &Utterance) -> Result<(), DomainError>;

    /// Pause the current utterance in place.
    fn pause(&self);

    /// Continue a paused utterance.
    fn resume(&self);

    /// Drop the current utterance and anything queued.
    fn cancel(&self);

    /// Whether `pause`/`resume` continue mid-utterance. When false the
    /// caller restarts the sentence on resume.
    fn supports_pause(&self) -> bool;

    /// Voices the engine can speak with.
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Subscribe to utterance start, end and error events.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
