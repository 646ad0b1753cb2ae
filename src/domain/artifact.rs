use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::markup;

/// The four study materials produced from one source document.
///
/// `ALL` is the generation order; the first kind is the view selected after
/// a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Notes,
    Mindmap,
    Quiz,
    Flashcard,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Notes,
        ArtifactKind::Mindmap,
        ArtifactKind::Quiz,
        ArtifactKind::Flashcard,
    ];

    /// Stable identifier used in file names and config.
    pub fn id(&self) -> &'static str {
        match self {
            ArtifactKind::Notes => "notes",
            ArtifactKind::Mindmap => "mindmap",
            ArtifactKind::Quiz => "quiz",
            ArtifactKind::Flashcard => "flashcard",
        }
    }

    /// Progress line shown while this kind is being generated.
    pub fn progress_message(&self) -> &'static str {
        match self {
            ArtifactKind::Notes => "Creating smart notes...",
            ArtifactKind::Mindmap => "Building mind map...",
            ArtifactKind::Quiz => "Crafting quiz questions...",
            ArtifactKind::Flashcard => "Designing flashcards...",
        }
    }

    fn slot(&self) -> usize {
        match self {
            ArtifactKind::Notes => 0,
            ArtifactKind::Mindmap => 1,
            ArtifactKind::Quiz => 2,
            ArtifactKind::Flashcard => 3,
        }
    }

    pub fn from_id(s: &str) -> Option<Self> {
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.id().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::Notes => "notes",
            ArtifactKind::Mindmap => "mind map",
            ArtifactKind::Quiz => "quiz",
            ArtifactKind::Flashcard => "flashcards",
        };
        f.write_str(label)
    }
}

/// Cleaned model output for one artifact kind.
///
/// `markup` is the sanitizer output that passed the acceptance gate.
/// `safe_markup` is the same content after the markup safety pass and is
/// what renderers and the speech pacer consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedArtifact {
    kind: ArtifactKind,
    markup: String,
    safe_markup: String,
    endpoint: String,
}

impl SanitizedArtifact {
    pub(crate) fn new(kind: ArtifactKind, markup: String, endpoint: impl Into<String>) -> Self {
        let safe_markup = markup::make_safe(&markup);
        Self {
            kind,
            markup,
            safe_markup,
            endpoint: endpoint.into(),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn safe_markup(&self) -> &str {
        &self.safe_markup
    }

    /// Name of the endpoint that produced this artifact.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn char_len(&self) -> usize {
        self.markup.chars().count()
    }
}

/// Per-session artifact slots.
///
/// Rendering code reads through the accessors; only the orchestrator writes.
/// A slot is either empty or holds a whole artifact, never a partial one.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSession {
    slots: [Option<SanitizedArtifact>; 4],
    active_view: Option<ArtifactKind>,
}

impl ArtifactSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&SanitizedArtifact> {
        self.slots[kind.slot()].as_ref()
    }

    pub fn active_view(&self) -> Option<ArtifactKind> {
        self.active_view
    }

    /// Stored artifacts in generation order.
    pub fn artifacts(&self) -> impl Iterator<Item = &SanitizedArtifact> {
        self.slots.iter().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub(crate) fn store(&mut self, artifact: SanitizedArtifact) {
        let slot = artifact.kind().slot();
        self.slots[slot] = Some(artifact);
    }

    pub(crate) fn select(&mut self, kind: ArtifactKind) {
        self.active_view = Some(kind);
    }
}

/// Progress published by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum GenerationEvent {
    RunStarted {
        source_chars: usize,
    },
    KindStarted {
        kind: ArtifactKind,
        message: String,
    },
    EndpointAttempt {
        kind: ArtifactKind,
        attempt: usize,
        total: usize,
        endpoint: String,
    },
    EndpointFailed {
        kind: ArtifactKind,
        attempt: usize,
        endpoint: String,
        reason: String,
    },
    KindCompleted {
        kind: ArtifactKind,
        endpoint: String,
        chars: usize,
    },
    RunCompleted,
    RunFailed {
        kind: ArtifactKind,
        reason: String,
    },
    Cancelled {
        kind: ArtifactKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_order() {
        assert_eq!(
            ArtifactKind::ALL,
            [
                ArtifactKind::Notes,
                ArtifactKind::Mindmap,
                ArtifactKind::Quiz,
                ArtifactKind::Flashcard
            ]
        );
    }

    #[test]
    fn test_kind_from_id() {
        assert_eq!(ArtifactKind::from_id("MindMap"), Some(ArtifactKind::Mindmap));
        assert_eq!(ArtifactKind::from_id("flashcard"), Some(ArtifactKind::Flashcard));
        assert_eq!(ArtifactKind::from_id("summary"), None);
    }

    #[test]
    fn test_session_store_overwrites_whole_slot() {
        let mut session = ArtifactSession::new();
        assert!(session.get(ArtifactKind::Quiz).is_none());

        session.store(SanitizedArtifact::new(
            ArtifactKind::Quiz,
            "<h2>First</h2>".to_string(),
            "a",
        ));
        session.store(SanitizedArtifact::new(
            ArtifactKind::Quiz,
            "<h2>Second</h2>".to_string(),
            "b",
        ));

        let quiz = session.get(ArtifactKind::Quiz).unwrap();
        assert_eq!(quiz.markup(), "<h2>Second</h2>");
        assert_eq!(quiz.endpoint(), "b");
        assert_eq!(session.artifacts().count(), 1);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_artifact_exposes_safe_markup() {
        let artifact = SanitizedArtifact::new(
            ArtifactKind::Flashcard,
            r#"<div class="flashcard" onclick="flip()"><p>Q</p></div>"#.to_string(),
            "gemini-2.5-flash",
        );
        assert!(artifact.markup().contains("onclick"));
        assert!(!artifact.safe_markup().contains("onclick"));
        assert!(artifact.safe_markup().contains(r#"class="flashcard""#));
    }
}
