//! Run diagnostics
//!
//! Non-fatal conditions found during a run are collected here and handed back
//! to the caller, which decides how to surface them. Every entry is also
//! emitted as a `tracing` event when recorded.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single diagnostic message
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Ordered log of diagnostics accumulated during a run
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.push(Severity::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push(Severity::Error, message);
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.entries.push(Diagnostic { severity, message });
    }

    /// Append all entries of `other`, without re-emitting them
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    #[inline]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn messages(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |d| d.severity == severity)
            .map(|d| d.message.as_str())
    }

    #[inline]
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    #[inline]
    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Warning)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Alert title for the end-of-run summary, `None` if there is nothing to alert
    pub fn title(&self) -> Option<&'static str> {
        if self.has_errors() {
            Some("Error Alert")
        } else if self.has_warnings() {
            Some("Warning Alert")
        } else {
            None
        }
    }

    /// End-of-run alert text listing errors first, then warnings
    pub fn summary(&self) -> Option<String> {
        let errors: Vec<&str> = self.messages(Severity::Error).collect();
        let warnings: Vec<&str> = self.messages(Severity::Warning).collect();

        match (errors.is_empty(), warnings.is_empty()) {
            (true, true) => None,
            (false, true) => Some(format!("Errors:\n{}", errors.join("\n"))),
            (true, false) => Some(warnings.join("\n")),
            (false, false) => Some(format!(
                "Errors:\n{}\n\nWarnings:\n{}",
                errors.join("\n"),
                warnings.join("\n")
            )),
        }
    }
}
