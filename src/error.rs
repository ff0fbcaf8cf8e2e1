use std::path::PathBuf;

use thiserror::Error;

/// Reasons a file could not become the current asset.
///
/// The `Display` text is what the player shows to the user; a failed load
/// never changes the asset that is already playing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("file not found: {}", path.display())]
    Missing { path: PathBuf },
    #[error("unsupported audio format: {} ({reason})", path.display())]
    Unsupported { path: PathBuf, reason: String },
    #[error("could not decode {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("no audio frames in {}", path.display())]
    Empty { path: PathBuf },
}

impl LoadError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Missing { path }
            | LoadError::Unsupported { path, .. }
            | LoadError::Corrupt { path, .. }
            | LoadError::Empty { path } => path,
        }
    }
}
