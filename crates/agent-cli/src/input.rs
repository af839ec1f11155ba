//! Line parsing for inline `--image` / `--file` directives

use std::path::PathBuf;

/// One parsed input line
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub message: String,
    pub images: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

impl TurnInput {
    /// Split a line into free text and attachment paths
    ///
    /// A directive without a following path is kept as text.
    pub fn parse(line: &str) -> Self {
        let mut input = Self::default();
        let mut words = Vec::new();
        let mut tokens = line.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            match (token, tokens.peek()) {
                ("--image", Some(path)) => {
                    input.images.push(PathBuf::from(path));
                    tokens.next();
                }
                ("--file", Some(path)) => {
                    input.files.push(PathBuf::from(path));
                    tokens.next();
                }
                _ => words.push(token),
            }
        }

        input.message = words.join(" ");
        input
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.images.is_empty() && self.files.is_empty()
    }

    /// Every attachment path, images first
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.images.iter().chain(self.files.iter())
    }
}
