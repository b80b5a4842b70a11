//! Function declarations and the function-body collaborator contract

use std::sync::Arc;

use super::{DependencyRef, Escalation, EscalationConfig, ManagedObjectConfig, Object};
use crate::runtime::engine::FunctionContext;

/// Executable body of a function.
///
/// Supplied by a function-body provider as plain data: the body reads its
/// parameter and injected objects through the [`FunctionContext`], may
/// request flows, and returns the value passed to the default continuation.
pub trait FunctionBody: Send + Sync + 'static {
    fn execute(
        &self,
        ctx: &mut FunctionContext<'_>,
    ) -> Result<Option<Object>, Escalation>;
}

impl<F> FunctionBody for F
where
    F: Fn(&mut FunctionContext<'_>) -> Result<Option<Object>, Escalation> + Send + Sync + 'static,
{
    fn execute(
        &self,
        ctx: &mut FunctionContext<'_>,
    ) -> Result<Option<Object>, Escalation> {
        self(ctx)
    }
}

/// A flow a function may instigate, addressed by its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Flow name (diagnostics only)
    pub name: String,
    /// Target function
    pub function: String,
    /// Type of the argument passed to the target
    pub argument_type: Option<String>,
    /// Run the flow on a new thread of the same process
    pub spawn_thread: bool,
}

impl FlowConfig {
    /// Sequential flow
    pub fn new(
        name: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            function: function.into(),
            argument_type: None,
            spawn_thread: false,
        }
    }

    /// Set the argument type
    pub fn argument_type(
        mut self,
        type_name: impl Into<String>,
    ) -> Self {
        self.argument_type = Some(type_name.into());
        self
    }

    /// Run on a spawned thread
    pub fn spawn_thread(mut self) -> Self {
        self.spawn_thread = true;
        self
    }
}

/// Declaration of one function
#[derive(Clone)]
pub struct FunctionConfig {
    pub name: String,
    /// Assigned team (`None` uses the office default team)
    pub team: Option<String>,
    pub parameter_type: Option<String>,
    pub return_type: Option<String>,
    /// Injected objects, in position order
    pub objects: Vec<DependencyRef>,
    /// Function-scoped objects, created per invocation
    pub function_objects: Vec<ManagedObjectConfig>,
    pub flows: Vec<FlowConfig>,
    /// Default continuation
    pub next: Option<String>,
    /// Function-level escalation handlers
    pub escalations: Vec<EscalationConfig>,
    /// Escalation types the body declares it may raise
    pub declared_escalations: Vec<String>,
    pub governance: Vec<String>,
    pub pre_administration: Vec<String>,
    pub post_administration: Vec<String>,
    pub body: Arc<dyn FunctionBody>,
}

impl std::fmt::Debug for FunctionConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FunctionConfig")
            .field("name", &self.name)
            .field("team", &self.team)
            .field("parameter_type", &self.parameter_type)
            .field("return_type", &self.return_type)
            .field("objects", &self.objects)
            .field("function_objects", &self.function_objects)
            .field("flows", &self.flows)
            .field("next", &self.next)
            .field("escalations", &self.escalations)
            .field("declared_escalations", &self.declared_escalations)
            .field("governance", &self.governance)
            .field("pre_administration", &self.pre_administration)
            .field("post_administration", &self.post_administration)
            .finish()
    }
}

impl FunctionConfig {
    /// Declare a function from a closure body
    pub fn new<F>(
        name: impl Into<String>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut FunctionContext<'_>) -> Result<Option<Object>, Escalation> + Send + Sync + 'static,
    {
        Self::with_body(name, Arc::new(body))
    }

    /// Declare a function from a shared body
    pub fn with_body(
        name: impl Into<String>,
        body: Arc<dyn FunctionBody>,
    ) -> Self {
        Self {
            name: name.into(),
            team: None,
            parameter_type: None,
            return_type: None,
            objects: Vec::new(),
            function_objects: Vec::new(),
            flows: Vec::new(),
            next: None,
            escalations: Vec::new(),
            declared_escalations: Vec::new(),
            governance: Vec::new(),
            pre_administration: Vec::new(),
            post_administration: Vec::new(),
            body,
        }
    }

    pub fn team(
        mut self,
        team: impl Into<String>,
    ) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn parameter_type(
        mut self,
        type_name: impl Into<String>,
    ) -> Self {
        self.parameter_type = Some(type_name.into());
        self
    }

    pub fn return_type(
        mut self,
        type_name: impl Into<String>,
    ) -> Self {
        self.return_type = Some(type_name.into());
        self
    }

    /// Inject an object at the next position
    pub fn object(
        mut self,
        dependency: DependencyRef,
    ) -> Self {
        self.objects.push(dependency);
        self
    }

    /// Declare a function-scoped object
    pub fn function_object(
        mut self,
        object: ManagedObjectConfig,
    ) -> Self {
        self.function_objects.push(object);
        self
    }

    pub fn flow(
        mut self,
        flow: FlowConfig,
    ) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn next(
        mut self,
        function: impl Into<String>,
    ) -> Self {
        self.next = Some(function.into());
        self
    }

    /// Handle an escalation type with the given function
    pub fn escalation(
        mut self,
        escalation_type: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        self.escalations
            .push(EscalationConfig::new(escalation_type, handler));
        self
    }

    pub fn declares_escalation(
        mut self,
        escalation_type: impl Into<String>,
    ) -> Self {
        self.declared_escalations.push(escalation_type.into());
        self
    }

    pub fn governed_by(
        mut self,
        governance: impl Into<String>,
    ) -> Self {
        self.governance.push(governance.into());
        self
    }

    pub fn pre_administration(
        mut self,
        administration: impl Into<String>,
    ) -> Self {
        self.pre_administration.push(administration.into());
        self
    }

    pub fn post_administration(
        mut self,
        administration: impl Into<String>,
    ) -> Self {
        self.post_administration.push(administration.into());
        self
    }
}
