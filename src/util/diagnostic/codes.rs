//! Issue code registry
//!
//! Every construction issue is created from a registered [`IssueCode`] whose
//! message template is filled in through [`IssueBuilder`].
//!
//! | Range | Category |
//! |-------|----------|
//! | C01xx | names and references |
//! | C02xx | types and scopes |
//! | C03xx | graph structure |
//! | C04xx | configuration values |

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{Issue, Severity};

/// Issue kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    DuplicateName,
    UnresolvedReference,
    AmbiguousQualifier,
    TypeMismatch,
    ScopeMismatch,
    DependencyCycle,
    EscalationHierarchyCycle,
    InvalidConfiguration,
}

impl std::fmt::Display for IssueKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let text = match self {
            IssueKind::DuplicateName => "duplicate name",
            IssueKind::UnresolvedReference => "unresolved reference",
            IssueKind::AmbiguousQualifier => "ambiguous qualifier",
            IssueKind::TypeMismatch => "type mismatch",
            IssueKind::ScopeMismatch => "scope mismatch",
            IssueKind::DependencyCycle => "dependency cycle",
            IssueKind::EscalationHierarchyCycle => "escalation hierarchy cycle",
            IssueKind::InvalidConfiguration => "invalid configuration",
        };
        f.write_str(text)
    }
}

/// Registered issue code (metadata only, messages are rendered by the builder)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueCode {
    /// Code, e.g. "C0101"
    pub code: &'static str,
    /// Kind
    pub kind: IssueKind,
    /// Message template with `{param}` placeholders
    pub message_template: &'static str,
}

impl IssueCode {
    pub const DUPLICATE_NAME: IssueCode = IssueCode {
        code: "C0101",
        kind: IssueKind::DuplicateName,
        message_template: "duplicate {namespace} name '{name}'",
    };

    pub const UNRESOLVED_REFERENCE: IssueCode = IssueCode {
        code: "C0102",
        kind: IssueKind::UnresolvedReference,
        message_template: "unknown {what} '{name}'",
    };

    pub const AMBIGUOUS_QUALIFIER: IssueCode = IssueCode {
        code: "C0103",
        kind: IssueKind::AmbiguousQualifier,
        message_template: "dependency of type '{type_name}' is satisfied by {candidates}; a qualifier is required",
    };

    pub const TYPE_MISMATCH: IssueCode = IssueCode {
        code: "C0201",
        kind: IssueKind::TypeMismatch,
        message_template: "{what}: expected '{expected}' but found '{found}'",
    };

    pub const SCOPE_MISMATCH: IssueCode = IssueCode {
        code: "C0202",
        kind: IssueKind::ScopeMismatch,
        message_template: "{scope} object '{object}' cannot depend on {dependency_scope} object '{dependency}'",
    };

    pub const DEPENDENCY_CYCLE: IssueCode = IssueCode {
        code: "C0301",
        kind: IssueKind::DependencyCycle,
        message_template: "managed object dependency cycle: {path}",
    };

    pub const ESCALATION_HIERARCHY_CYCLE: IssueCode = IssueCode {
        code: "C0302",
        kind: IssueKind::EscalationHierarchyCycle,
        message_template: "escalation type hierarchy cycle: {path}",
    };

    pub const INVALID_CONFIGURATION: IssueCode = IssueCode {
        code: "C0401",
        kind: IssueKind::InvalidConfiguration,
        message_template: "{message}",
    };

    /// Find a code definition
    pub fn find(code: &str) -> Option<&'static IssueCode> {
        BY_CODE.get(code).copied()
    }

    /// All registered codes
    pub fn all() -> &'static [IssueCode] {
        ISSUE_CODES
    }

    /// Codes of the given kind
    pub fn by_kind(kind: IssueKind) -> impl Iterator<Item = &'static IssueCode> {
        ISSUE_CODES.iter().filter(move |c| c.kind == kind)
    }

    /// Start building an issue with this code
    #[inline]
    pub fn builder(&self) -> IssueBuilder {
        IssueBuilder::new(*self)
    }
}

static ISSUE_CODES: &[IssueCode] = &[
    IssueCode::DUPLICATE_NAME,
    IssueCode::UNRESOLVED_REFERENCE,
    IssueCode::AMBIGUOUS_QUALIFIER,
    IssueCode::TYPE_MISMATCH,
    IssueCode::SCOPE_MISMATCH,
    IssueCode::DEPENDENCY_CYCLE,
    IssueCode::ESCALATION_HIERARCHY_CYCLE,
    IssueCode::INVALID_CONFIGURATION,
];

static BY_CODE: Lazy<HashMap<&'static str, &'static IssueCode>> =
    Lazy::new(|| ISSUE_CODES.iter().map(|c| (c.code, c)).collect());

/// Issue builder (template parameters, severity and source node)
#[derive(Debug, Clone)]
pub struct IssueBuilder {
    code: IssueCode,
    params: Vec<(&'static str, String)>,
    severity: Severity,
    source: String,
}

impl IssueBuilder {
    /// Create a builder for the given code
    pub fn new(code: IssueCode) -> Self {
        Self {
            code,
            params: Vec::new(),
            severity: Severity::Error,
            source: String::new(),
        }
    }

    /// Add a template parameter
    pub fn param(
        mut self,
        key: &'static str,
        value: impl Into<String>,
    ) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Name the configuration node the issue is raised against
    #[inline]
    pub fn against(
        mut self,
        source: impl Into<String>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Downgrade to a warning
    #[inline]
    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Render the template into an [`Issue`].
    ///
    /// Placeholders without a parameter are left verbatim.
    pub fn build(self) -> Issue {
        let mut message = String::with_capacity(self.code.message_template.len());
        let mut rest = self.code.message_template;
        while let Some(open) = rest.find('{') {
            message.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.params.iter().find(|(k, _)| *k == key) {
                        Some((_, value)) => message.push_str(value),
                        None => {
                            message.push('{');
                            message.push_str(key);
                            message.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    message.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        message.push_str(rest);

        Issue {
            code: self.code.code,
            kind: self.code.kind,
            severity: self.severity,
            source: self.source,
            message,
        }
    }
}
