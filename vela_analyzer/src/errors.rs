//! Diagnostic collection.
//!
//! Analyzer errors are collected, never thrown: each pass records what it
//! finds and keeps going, using absent lookups as the signal that a
//! problem was already reported. At pass boundaries the driver checks the
//! batch; a non-empty batch aborts the compile and prints in line order.
//! The first message recorded for a line wins.

use std::collections::BTreeMap;
use std::fmt;
use vela_core::SourceLoc;

/// Ordered diagnostic batch.
#[derive(Debug, Default)]
pub struct ErrorBatch {
    by_line: BTreeMap<(String, u32), String>,
}

impl ErrorBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error at a source location.
    pub fn add(&mut self, loc: &SourceLoc, message: impl Into<String>) {
        let rendered = format!("{}:{}: {}", loc.file, loc.line, message.into());
        self.by_line
            .entry((loc.file.to_string(), loc.line))
            .or_insert(rendered);
    }

    /// Record a file-level error with no line.
    pub fn add_file(&mut self, file: &str, message: impl Into<String>) {
        let rendered = format!("{}: {}", file, message.into());
        self.by_line
            .entry((file.to_string(), 0))
            .or_insert(rendered);
    }

    /// Whether any error was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }

    /// Number of recorded errors.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_line.len()
    }

    /// Rendered messages in (file, line) order.
    pub fn messages(&self) -> Vec<&str> {
        self.by_line.values().map(String::as_str).collect()
    }

    /// Whether any message contains the fragment. Test support.
    pub fn contains(&self, fragment: &str) -> bool {
        self.by_line.values().any(|m| m.contains(fragment))
    }
}

impl fmt::Display for ErrorBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in self.by_line.values() {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_ordering() {
        let mut batch = ErrorBatch::new();
        batch.add(&SourceLoc::new("a.vl", 9), "late");
        batch.add(&SourceLoc::new("a.vl", 2), "early");

        let messages = batch.messages();
        assert_eq!(messages, vec!["a.vl:2: early", "a.vl:9: late"]);
    }

    #[test]
    fn test_first_error_per_line_wins() {
        let mut batch = ErrorBatch::new();
        batch.add(&SourceLoc::new("a.vl", 4), "first");
        batch.add(&SourceLoc::new("a.vl", 4), "second");

        assert_eq!(batch.len(), 1);
        assert!(batch.contains("first"));
    }
}
