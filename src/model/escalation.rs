//! Escalations: the runtime failure value and its handler declarations

use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::engine::ProcessId;

/// A failure raised by a function body, a managed object source, an
/// administration or governance hook, or by the runtime itself (timeouts,
/// cancellation, panics).
///
/// Escalations are matched by `kind` against the office's escalation type
/// hierarchy.
#[derive(Debug, Clone)]
pub struct Escalation {
    kind: Cow<'static, str>,
    message: String,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Escalation {
    /// Root of every escalation type hierarchy
    pub const EXCEPTION: &'static str = "Exception";
    /// An asset (asynchronous object or flow) did not complete in time
    pub const ASSET_TIMEOUT: &'static str = "AssetTimeoutEscalation";
    /// The owning process was cancelled
    pub const PROCESS_CANCELLED: &'static str = "ProcessCancelledEscalation";
    /// A collaborator panicked
    pub const PANIC: &'static str = "PanicEscalation";
    /// A team could not accept work
    pub const TEAM_FAILURE: &'static str = "TeamFailureEscalation";

    /// Built-in kinds, all direct children of [`Escalation::EXCEPTION`]
    pub const BUILT_IN: &'static [&'static str] = &[
        Self::ASSET_TIMEOUT,
        Self::PROCESS_CANCELLED,
        Self::PANIC,
        Self::TEAM_FAILURE,
    ];

    /// Create an escalation of the given kind
    pub fn new(
        kind: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the underlying error
    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Timeout of an outstanding asset
    pub fn timeout(
        what: &str,
        after: Duration,
    ) -> Self {
        Self::new(
            Self::ASSET_TIMEOUT,
            format!("{} timed out after {:?}", what, after),
        )
    }

    /// Process cancellation
    pub fn cancelled(reason: &str) -> Self {
        Self::new(Self::PROCESS_CANCELLED, reason.to_string())
    }

    /// Convert a caught panic payload
    pub fn panic(
        during: &str,
        payload: &(dyn Any + Send),
    ) -> Self {
        let detail = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(Self::PANIC, format!("panic during {}: {}", during, detail))
    }

    /// Team failure
    pub fn team_failure(
        team: &str,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(Self::TEAM_FAILURE, format!("team '{}' rejected work", team)).with_cause(cause)
    }

    /// Escalation type name
    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Message
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying error, if any
    #[inline]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Check the kind
    #[inline]
    pub fn is_kind(
        &self,
        kind: &str,
    ) -> bool {
        self.kind == kind
    }
}

impl std::fmt::Display for Escalation {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Escalation {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Declares a type in the office's escalation type hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTypeConfig {
    /// Type name
    pub name: String,
    /// Parent type (`None` means [`Escalation::EXCEPTION`])
    pub parent: Option<String>,
}

/// Maps an escalation type to the function that handles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationConfig {
    /// Handled escalation type
    pub escalation_type: String,
    /// Handler function name
    pub handler: String,
}

impl EscalationConfig {
    /// Create a handler declaration
    pub fn new(
        escalation_type: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            escalation_type: escalation_type.into(),
            handler: handler.into(),
        }
    }
}

/// Top-level collector for escalations that no function or office handler
/// takes. The owning process is torn down after it is notified.
pub trait UnhandledEscalationHandler: Send + Sync + 'static {
    fn handle(
        &self,
        process: ProcessId,
        escalation: &Escalation,
    );
}

impl<F> UnhandledEscalationHandler for F
where
    F: Fn(ProcessId, &Escalation) + Send + Sync + 'static,
{
    fn handle(
        &self,
        process: ProcessId,
        escalation: &Escalation,
    ) {
        self(process, escalation)
    }
}
