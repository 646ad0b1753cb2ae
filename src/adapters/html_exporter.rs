use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::domain::{DomainError, SanitizedArtifact};
use crate::ports::ArtifactExporter;

/// Writes artifacts as standalone HTML documents named
/// `cogni-flow-<kind>.html`.
pub struct HtmlFileExporter {
    dir: PathBuf,
}

impl HtmlFileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(artifact: &SanitizedArtifact) -> String {
        format!("cogni-flow-{}.html", artifact.kind().id())
    }
}

fn render_document(artifact: &SanitizedArtifact) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Cogni-Flow {}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        artifact.kind(),
        artifact.safe_markup()
    )
}

impl ArtifactExporter for HtmlFileExporter {
    fn export(&self, artifact: &SanitizedArtifact) -> Result<PathBuf, DomainError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(artifact));
        fs::write(&path, render_document(artifact))?;

        info!(path = ?path, kind = artifact.kind().id(), "Artifact exported");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtifactKind;
    use tempfile::TempDir;

    #[test]
    fn test_export_notes_file() {
        let dir = TempDir::new().unwrap();
        let exporter = HtmlFileExporter::new(dir.path().join("out"));
        let artifact = SanitizedArtifact::new(
            ArtifactKind::Notes,
            "<h2>Cells</h2><script>x()</script><p>Cells are small.</p>".to_string(),
            "gemini-2.5-flash",
        );

        let path = exporter.export(&artifact).unwrap();
        assert!(path.ends_with("cogni-flow-notes.html"));

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<!DOCTYPE html>"));
        assert!(written.contains("<h2>Cells</h2><p>Cells are small.</p>"));
        assert!(!written.contains("<script>"));
    }

    #[test]
    fn test_export_overwrites_previous() {
        let dir = TempDir::new().unwrap();
        let exporter = HtmlFileExporter::new(dir.path());
        for body in ["<p>first version of the quiz</p>", "<p>second version of the quiz</p>"] {
            let artifact = SanitizedArtifact::new(ArtifactKind::Quiz, body.to_string(), "m");
            exporter.export(&artifact).unwrap();
        }
        let written = fs::read_to_string(dir.path().join("cogni-flow-quiz.html")).unwrap();
        assert!(written.contains("second version"));
        assert!(!written.contains("first version"));
    }
}
