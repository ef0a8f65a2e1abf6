use std::borrow::Cow;
use std::path::PathBuf;

/// A file under the watched root was closed after being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path relative to the watched root.
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The relative path as text, for pattern matching.
    pub fn path_str(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }
}
