use std::path::PathBuf;

use crate::domain::{DomainError, SanitizedArtifact};

/// Port for saving generated artifacts outside the session.
pub trait ArtifactExporter: Send + Sync {
    /// Write one artifact and return where it went.
    fn export(&self, artifact: &SanitizedArtifact) -> Result<PathBuf, DomainError>;
}
