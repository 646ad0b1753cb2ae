use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Playback state machine.
///
/// State transitions:
/// - Idle -> Playing (play)
/// - Playing -> Paused (pause)
/// - Paused -> Playing (resume)
/// - Playing/Paused -> Playing (rewind, skip, rate change restart the
///   sentence at the new index or rate)
/// - Any -> Idle (stop, completion, engine error)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechState {
    Idle,
    Playing,
    Paused,
}

impl SpeechState {
    #[must_use]
    pub fn can_pause(&self) -> bool {
        matches!(self, SpeechState::Playing)
    }

    #[must_use]
    pub fn can_resume(&self) -> bool {
        matches!(self, SpeechState::Paused)
    }

    /// Whether a session exists that rewind and skip can act on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, SpeechState::Playing | SpeechState::Paused)
    }
}

pub const MIN_RATE: f32 = 0.1;
pub const MAX_RATE: f32 = 10.0;

/// Clamp a requested playback rate into the range engines accept.
pub fn clamp_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

/// One unit of text handed to the speech engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    /// Unique per pacer; engine events carry it back.
    pub id: u64,
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Voice name, or `None` for the engine default.
    pub voice: Option<String>,
}

/// A voice offered by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP 47 tag, e.g. `en-US`.
    pub lang: String,
}

impl VoiceInfo {
    fn is_english(&self) -> bool {
        self.lang.to_ascii_lowercase().starts_with("en")
    }
}

/// Voice-name fragments that usually mark the higher quality voices.
pub fn default_voice_markers() -> Vec<String> {
    ["Natural", "Premium", "Enhanced", "Google", "Microsoft"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Pick an English voice whose name contains one of `markers`, else the
/// first English voice, else none (engine default).
pub fn select_voice<'a>(voices: &'a [VoiceInfo], markers: &[String]) -> Option<&'a VoiceInfo> {
    voices
        .iter()
        .filter(|v| v.is_english())
        .find(|v| markers.iter().any(|m| v.name.contains(m.as_str())))
        .or_else(|| voices.iter().find(|v| v.is_english()))
}

/// How long to wait for an utterance's end event before advancing anyway.
///
/// Grows with the text length and shrinks with the playback rate.
pub fn fallback_delay(chars: usize, rate: f32, ms_per_char: u64, slack_ms: u64) -> Duration {
    let speaking_ms = (chars as f64 * ms_per_char as f64) / f64::from(clamp_rate(rate));
    Duration::from_millis(speaking_ms.ceil() as u64 + slack_ms)
}

/// Sentences being read and the position in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSession {
    sentences: Vec<String>,
    index: usize,
}

impl SpeechSession {
    pub fn new(sentences: Vec<String>) -> Self {
        Self {
            sentences,
            index: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn current(&self) -> Option<&str> {
        self.sentences.get(self.index).map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.sentences.len()
    }

    /// Move to the next sentence.
    pub fn advance(&mut self) {
        self.index = (self.index + 1).min(self.sentences.len());
    }

    /// Move back `count` sentences, stopping at the first.
    pub fn rewind(&mut self, count: usize) {
        self.index = self.index.saturating_sub(count);
    }
}

/// Events published by the speech pacer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SpeechEvent {
    StateChanged {
        from: SpeechState,
        to: SpeechState,
    },
    SentenceStarted {
        index: usize,
        total: usize,
        text: String,
    },
    RateChanged {
        rate: f32,
    },
    Completed,
    Error {
        message: String,
    },
}

/// Callbacks reported by a speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Started { utterance_id: u64 },
    Ended { utterance_id: u64 },
    Error { utterance_id: u64, message: String },
}
