//! Configuration model
//!
//! Author-supplied, immutable descriptions of an office: teams, managed
//! objects, functions (with their flows and escalation handlers),
//! administration, governance and the escalation type hierarchy. Every
//! declaration is kept as a [`ConfigNode`] in registration order; the
//! construct module turns the nodes into bound metadata.
//!
//! # Example
//!
//! ```
//! use officefloor::model::{FunctionConfig, OfficeConfig, TeamConfig};
//!
//! let config = OfficeConfig::new("office")
//!     .team(TeamConfig::executor("T1", 1))
//!     .function(FunctionConfig::new("F1", |ctx| Ok(ctx.parameter().cloned())).team("T1"));
//! assert_eq!(config.nodes().len(), 2);
//! ```

pub mod escalation;
pub mod function;
pub mod govern;
pub mod object;
pub mod team;

pub use escalation::{Escalation, EscalationConfig, EscalationTypeConfig, UnhandledEscalationHandler};
pub use function::{FlowConfig, FunctionBody, FunctionConfig};
pub use govern::{Administration, AdministrationConfig, Governance, GovernanceConfig};
pub use object::{FnSource, ManagedObjectConfig, ManagedObjectSource};
pub use team::{TeamConfig, TeamKind};

use std::any::Any;
use std::sync::Arc;

/// A type-erased value: parameters, managed objects and extension interfaces.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Wrap a value as an [`Object`]
#[inline]
pub fn object<T: Any + Send + Sync>(value: T) -> Object {
    Arc::new(value)
}

/// Lifetime scope of a managed object.
///
/// Ordered by lifetime width: a dependency must live at least as long as its
/// dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// One function invocation
    Function,
    /// One thread chain
    Thread,
    /// One process (shared by all of its threads)
    Process,
}

impl std::fmt::Display for Scope {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Scope::Function => write!(f, "function"),
            Scope::Thread => write!(f, "thread"),
            Scope::Process => write!(f, "process"),
        }
    }
}

/// Reference from a function, object or administration to a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    /// By declared name
    Named(String),
    /// By object type, optionally narrowed by qualifier
    Typed {
        type_name: String,
        qualifier: Option<String>,
    },
}

impl DependencyRef {
    /// Reference by name
    pub fn named(name: impl Into<String>) -> Self {
        DependencyRef::Named(name.into())
    }

    /// Reference by type
    pub fn typed(type_name: impl Into<String>) -> Self {
        DependencyRef::Typed {
            type_name: type_name.into(),
            qualifier: None,
        }
    }

    /// Reference by type and qualifier
    pub fn qualified(
        type_name: impl Into<String>,
        qualifier: impl Into<String>,
    ) -> Self {
        DependencyRef::Typed {
            type_name: type_name.into(),
            qualifier: Some(qualifier.into()),
        }
    }
}

impl std::fmt::Display for DependencyRef {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DependencyRef::Named(name) => write!(f, "{}", name),
            DependencyRef::Typed {
                type_name,
                qualifier: Some(qualifier),
            } => write!(f, "{}@{}", type_name, qualifier),
            DependencyRef::Typed { type_name, .. } => write!(f, "{}", type_name),
        }
    }
}

/// One author declaration.
#[derive(Debug, Clone)]
pub enum ConfigNode {
    Team(TeamConfig),
    ManagedObject(ManagedObjectConfig),
    Function(FunctionConfig),
    Administration(AdministrationConfig),
    Governance(GovernanceConfig),
    EscalationType(EscalationTypeConfig),
    OfficeEscalation(EscalationConfig),
}

impl ConfigNode {
    /// Name of the declaration
    pub fn name(&self) -> &str {
        match self {
            ConfigNode::Team(c) => &c.name,
            ConfigNode::ManagedObject(c) => &c.name,
            ConfigNode::Function(c) => &c.name,
            ConfigNode::Administration(c) => &c.name,
            ConfigNode::Governance(c) => &c.name,
            ConfigNode::EscalationType(c) => &c.name,
            ConfigNode::OfficeEscalation(c) => &c.escalation_type,
        }
    }

    /// Namespace the name is unique within
    pub fn namespace(&self) -> &'static str {
        match self {
            ConfigNode::Team(_) => "team",
            ConfigNode::ManagedObject(_) => "managed object",
            ConfigNode::Function(_) => "function",
            ConfigNode::Administration(_) => "administration",
            ConfigNode::Governance(_) => "governance",
            ConfigNode::EscalationType(_) => "escalation type",
            ConfigNode::OfficeEscalation(_) => "office escalation",
        }
    }
}

/// Registration API: the complete description of one office.
#[derive(Clone, Default)]
pub struct OfficeConfig {
    name: String,
    nodes: Vec<ConfigNode>,
    unhandled: Option<Arc<dyn UnhandledEscalationHandler>>,
}

impl std::fmt::Debug for OfficeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("OfficeConfig")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("unhandled", &self.unhandled.is_some())
            .finish()
    }
}

impl OfficeConfig {
    /// Create an empty office description
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            unhandled: None,
        }
    }

    /// Office name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declarations in registration order
    #[inline]
    pub fn nodes(&self) -> &[ConfigNode] {
        &self.nodes
    }

    /// Top-level handler for escalations no function or office handler takes
    #[inline]
    pub fn unhandled_escalation_handler(&self) -> Option<&Arc<dyn UnhandledEscalationHandler>> {
        self.unhandled.as_ref()
    }

    /// Submit any declaration
    pub fn node(
        mut self,
        node: ConfigNode,
    ) -> Self {
        self.nodes.push(node);
        self
    }

    /// Declare a team
    pub fn team(
        self,
        team: TeamConfig,
    ) -> Self {
        self.node(ConfigNode::Team(team))
    }

    /// Declare a thread or process scoped managed object
    pub fn managed_object(
        self,
        object: ManagedObjectConfig,
    ) -> Self {
        self.node(ConfigNode::ManagedObject(object))
    }

    /// Declare a function
    pub fn function(
        self,
        function: FunctionConfig,
    ) -> Self {
        self.node(ConfigNode::Function(function))
    }

    /// Declare an administration
    pub fn administration(
        self,
        administration: AdministrationConfig,
    ) -> Self {
        self.node(ConfigNode::Administration(administration))
    }

    /// Declare a governance
    pub fn governance(
        self,
        governance: GovernanceConfig,
    ) -> Self {
        self.node(ConfigNode::Governance(governance))
    }

    /// Declare an escalation type (`None` parent means `Exception`)
    pub fn escalation_type(
        self,
        name: impl Into<String>,
        parent: Option<&str>,
    ) -> Self {
        self.node(ConfigNode::EscalationType(EscalationTypeConfig {
            name: name.into(),
            parent: parent.map(str::to_string),
        }))
    }

    /// Register an office-level escalation handler
    pub fn escalation(
        self,
        escalation_type: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        self.node(ConfigNode::OfficeEscalation(EscalationConfig::new(
            escalation_type,
            handler,
        )))
    }

    /// Install the top-level handler
    pub fn on_unhandled_escalation(
        mut self,
        handler: Arc<dyn UnhandledEscalationHandler>,
    ) -> Self {
        self.unhandled = Some(handler);
        self
    }
}
