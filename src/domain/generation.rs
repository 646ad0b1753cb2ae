use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactKind, SourceDocument};

/// One candidate target for completions.
///
/// Endpoints are kept in preference order: fastest first, most capable last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    /// Model identifier, e.g. `gemini-2.5-flash`.
    pub name: String,
    /// Full `generateContent` URL, without credentials.
    pub url: String,
}

impl ModelEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Build the Gemini `generateContent` endpoint for `model` under `base_url`.
    pub fn gemini(base_url: &str, model: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self::new(model, format!("{}/models/{}:generateContent", base, model))
    }
}

/// Sampling parameters shared by every call in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 8192,
        }
    }
}

/// A rendered prompt for one artifact kind. Built fresh per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: ArtifactKind,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(kind: ArtifactKind, source: &SourceDocument) -> Self {
        Self {
            kind,
            prompt: render_prompt(kind, source.text()),
        }
    }
}

const NOTES_TEMPLATE: &str = "Create study notes from this content. Return ONLY clean HTML without any markdown code blocks, backticks, emojis, or formatting symbols:

{source}

Structure:
- <h2>[Title]</h2>
- <h3>Section headings</h3>
- <p>Short explanatory paragraphs</p>
- <ul><li>Key points</li></ul>
- <strong>Important terms</strong>
- No emojis or special characters

Return clean HTML only.";

const MINDMAP_TEMPLATE: &str = "Create a mind map from this content. Return ONLY clean HTML without markdown blocks, emojis, or special symbols. Keep sub-points SHORT (max 8 words each):

{source}

Use this EXACT structure:
<h2>[MAIN TOPIC]</h2>
<ul>
  <li>[BRANCH 1 - Short Title]
    <ul>
      <li>[Short sub-point 1]</li>
      <li>[Short sub-point 2]</li>
      <li>[Short sub-point 3]</li>
    </ul>
  </li>
  <li>[BRANCH 2 - Short Title]
    <ul>
      <li>[Short sub-point 1]</li>
      <li>[Short sub-point 2]</li>
    </ul>
  </li>
</ul>

Keep ALL text short and concise. Return clean HTML only. No emojis or special characters.";

const QUIZ_TEMPLATE: &str = "Create a quiz from this content. Return ONLY clean HTML without markdown blocks, emojis, or special symbols:

{source}

Structure:
<h2>Quiz Time!</h2>
<div class=\"q\">Question 1 text</div>
<ul>
  <li>A) Option A</li>
  <li>B) Option B</li>
  <li>C) Option C</li>
  <li>D) Option D</li>
</ul>
<div class=\"answer\">Correct: A) Option A</div>

Return clean HTML only. No emojis or special characters.";

const FLASHCARD_TEMPLATE: &str = "Create 8 flashcards from this content. Return ONLY clean HTML without markdown blocks, emojis, or special symbols:

{source}

Use this exact structure:
<div class=\"flashcard-deck\">
<div class=\"flashcard\">
    <div class=\"card-inner\">
        <div class=\"card-face card-front\">
            <p>[QUESTION]</p>
        </div>
        <div class=\"card-face card-back\">
            <p>[ANSWER]</p>
        </div>
    </div>
</div>
</div>

Return clean HTML only. No emojis or special characters.";

/// Render the prompt for `kind`, embedding `source` verbatim.
pub fn render_prompt(kind: ArtifactKind, source: &str) -> String {
    let template = match kind {
        ArtifactKind::Notes => NOTES_TEMPLATE,
        ArtifactKind::Mindmap => MINDMAP_TEMPLATE,
        ArtifactKind::Quiz => QUIZ_TEMPLATE,
        ArtifactKind::Flashcard => FLASHCARD_TEMPLATE,
    };
    template.replacen("{source}", source, 1)
}
