//! User-friendly diagnostic messages.
//!
//! Every error shown to a user carries its root cause, the facts that led to
//! it, and the steps that fix it.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when the lockfile is stale.
    pub const STALE_LOCK: &str = "Run `monorail update` to refresh the lockfile";

    /// Suggestion when the lockfile must be regenerated from scratch.
    pub const FULL_UPDATE: &str = "Run `monorail update --full` to regenerate the lockfile";

    /// Suggestion when the package manager keeps failing.
    pub const INSTALL_FAILED: &str =
        "Run `monorail install --purge --verbose` for a clean install with more details";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn with_severity(message: impl Into<String>, severity: Severity) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(message, Severity::Error)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(message, Severity::Warning)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        // Severity, colored unless disabled
        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            }
        };

        // Headline
        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        // File the problem is about
        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        // Facts that led here
        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        // Numbered fixes
        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// An error that may already have been printed to the user.
///
/// Code that prints a diagnostic at the point of failure wraps the error with
/// `already_reported = true`; the command dispatcher then exits without
/// printing it a second time.
#[derive(Debug, Error)]
#[error("{inner:#}")]
pub struct ReportedError {
    inner: anyhow::Error,
    already_reported: bool,
}

impl ReportedError {
    /// Wrap an error that has been shown to the user.
    pub fn reported(inner: impl Into<anyhow::Error>) -> Self {
        ReportedError {
            inner: inner.into(),
            already_reported: true,
        }
    }

    /// Wrap an error that still needs to be shown.
    pub fn unreported(inner: impl Into<anyhow::Error>) -> Self {
        ReportedError {
            inner: inner.into(),
            already_reported: false,
        }
    }

    /// Whether the user has already seen this error.
    pub fn already_reported(&self) -> bool {
        self.already_reported
    }

    /// The underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
