//! Construction diagnostics
//!
//! Issues raised while binding an office are collected rather than thrown,
//! so an author sees every problem of a configuration in a single pass.
//!
//! # Module layout
//!
//! - [`codes`] - issue code registry and [`IssueBuilder`]
//! - [`emitter`] - plain-text rendering of collected issues
//!
//! # Example
//!
//! ```
//! use officefloor::util::diagnostic::{IssueCode, IssueCollector};
//!
//! let mut issues = IssueCollector::new();
//! issues.report(
//!     IssueCode::DUPLICATE_NAME
//!         .builder()
//!         .param("namespace", "team")
//!         .param("name", "T1")
//!         .against("T1")
//!         .build(),
//! );
//! assert!(issues.has_errors());
//! ```

pub mod codes;
pub mod emitter;

pub use codes::{IssueBuilder, IssueCode, IssueKind};
pub use emitter::TextEmitter;


/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Reported, but the office is still built
    Warning,
    /// Prevents the office from being built
    Error,
}

impl Severity {
    /// Check if this severity aborts construction
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single construction issue.
///
/// Created through [`IssueBuilder`] so every issue carries a registered code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Registered issue code, e.g. `C0101`
    pub code: &'static str,
    /// Issue kind
    pub kind: IssueKind,
    /// Severity
    pub severity: Severity,
    /// Name of the configuration node the issue was raised against
    pub source: String,
    /// Rendered message
    pub message: String,
}

impl Issue {
    /// Check if this issue aborts construction
    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

impl std::fmt::Display for Issue {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.code, self.source, self.message
        )
    }
}

/// Collects issues across every construction phase.
#[derive(Debug, Clone, Default)]
pub struct IssueCollector {
    issues: Vec<Issue>,
}

impl IssueCollector {
    /// Create an empty collector
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue
    pub fn report(
        &mut self,
        issue: Issue,
    ) {
        match issue.severity {
            Severity::Error => tracing::debug!("construction issue: {}", issue),
            Severity::Warning => tracing::warn!("{}", issue),
        }
        self.issues.push(issue);
    }

    /// All issues in report order
    #[inline]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Issues that abort construction
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    /// Non-fatal issues
    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    /// Number of errors
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Number of warnings
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Check whether any error was reported
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    /// Check whether an issue of the given kind was reported
    pub fn contains_kind(
        &self,
        kind: IssueKind,
    ) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }

    /// Number of issues
    #[inline]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Check if nothing was reported
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Consume the collector
    #[inline]
    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}
