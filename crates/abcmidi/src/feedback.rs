//! Parser diagnostics.
//!
//! Parsing never stops on bad input. Every problem becomes a [`Feedback`]
//! entry tagged with the source line, and the parse carries on with a
//! documented default.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One diagnostic produced while parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub level: FeedbackLevel,
    pub message: String,
    /// 1-based source line, 0 when not tied to a line
    pub line: usize,
    /// 1-based column within the line, 0 when unknown
    pub column: usize,
    pub suggestion: Option<String>,
}

impl Feedback {
    pub fn new(level: FeedbackLevel, message: impl Into<String>, line: usize) -> Self {
        Feedback {
            level,
            message: message.into(),
            line,
            column: 0,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level)?;
        if self.line > 0 {
            write!(f, " (line {}", self.line)?;
            if self.column > 0 {
                write!(f, ", col {}", self.column)?;
            }
            write!(f, ")")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " [hint: {}]", suggestion)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackLevel {
    /// A field could not be parsed; a default was substituted or the field ignored
    Error,
    /// Parsed with assumptions, may not be what the author intended
    Warning,
    /// Minor note about how the input was interpreted
    Info,
}

impl fmt::Display for FeedbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackLevel::Error => write!(f, "error"),
            FeedbackLevel::Warning => write!(f, "warning"),
            FeedbackLevel::Info => write!(f, "info"),
        }
    }
}

/// Accumulates feedback while the parser walks the input
#[derive(Debug, Default)]
pub struct FeedbackCollector {
    feedback: Vec<Feedback>,
    current_line: usize,
    current_column: usize,
}

impl FeedbackCollector {
    pub fn new() -> Self {
        FeedbackCollector {
            feedback: Vec::new(),
            current_line: 1,
            current_column: 0,
        }
    }

    pub fn set_line(&mut self, line: usize) {
        self.current_line = line;
        self.current_column = 0;
    }

    pub fn set_column(&mut self, column: usize) {
        self.current_column = column;
    }

    pub fn line(&self) -> usize {
        self.current_line
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(FeedbackLevel::Error, message.into(), None);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(FeedbackLevel::Warning, message.into(), None);
    }

    pub fn warning_with_suggestion(
        &mut self,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.push(
            FeedbackLevel::Warning,
            message.into(),
            Some(suggestion.into()),
        );
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(FeedbackLevel::Info, message.into(), None);
    }

    fn push(&mut self, level: FeedbackLevel, message: String, suggestion: Option<String>) {
        match level {
            FeedbackLevel::Error => {
                tracing::warn!(line = self.current_line, "field error: {}", message)
            }
            FeedbackLevel::Warning => tracing::warn!(line = self.current_line, "{}", message),
            FeedbackLevel::Info => tracing::debug!(line = self.current_line, "{}", message),
        }
        let mut entry =
            Feedback::new(level, message, self.current_line).with_column(self.current_column);
        entry.suggestion = suggestion;
        self.feedback.push(entry);
    }

    pub fn has_errors(&self) -> bool {
        self.feedback
            .iter()
            .any(|f| f.level == FeedbackLevel::Error)
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    pub fn into_feedback(self) -> Vec<Feedback> {
        self.feedback
    }
}

/// A value together with the diagnostics gathered while producing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult<T> {
    pub value: T,
    pub feedback: Vec<Feedback>,
}

impl<T> ParseResult<T> {
    pub fn new(value: T, feedback: Vec<Feedback>) -> Self {
        ParseResult { value, feedback }
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback
            .iter()
            .filter(|f| f.level == FeedbackLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback
            .iter()
            .filter(|f| f.level == FeedbackLevel::Warning)
    }
}
