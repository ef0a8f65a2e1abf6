use regex::Regex;

/// Decides which changed paths are allowed to trigger the command.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    pattern: Option<Regex>,
}

impl PathFilter {
    pub fn new(pattern: Option<Regex>) -> Self {
        Self { pattern }
    }

    /// True when no pattern is set, or when the pattern matches anywhere in `path`.
    pub fn matches(&self, path: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(path),
            None => true,
        }
    }
}
