//! Raw metadata factories
//!
//! One factory per declaration kind. A factory checks what can be checked
//! from the declaration alone (plus the set of declared team names), fills
//! in defaults from the [`RuntimeConfig`] and reports problems to the
//! [`IssueCollector`]. A named declaration that fails local validation
//! still yields raw metadata with the failing part left out, so the linker
//! can index it and check its references without reporting the same root
//! cause again. Only nameless declarations are dropped.

use std::collections::HashSet;
use std::time::Duration;

use crate::model::{
    AdministrationConfig, ConfigNode, Escalation, EscalationConfig, EscalationTypeConfig,
    FunctionConfig, GovernanceConfig, ManagedObjectConfig, Scope, TeamConfig, TeamKind,
};
use crate::util::config::RuntimeConfig;
use crate::util::diagnostic::{IssueCode, IssueCollector};

/// Name of the team created when an office declares none
pub const IMPLICIT_TEAM: &str = "passive";

/// What the factories may consult beyond the declaration itself
#[derive(Debug, Clone, Copy)]
pub struct RawContext<'a> {
    pub config: &'a RuntimeConfig,
    /// Every declared team name (plus the implicit team, if any)
    pub teams: &'a [String],
    /// Team for functions that name none
    pub default_team: &'a str,
}

#[derive(Debug, Clone)]
pub struct RawTeamMetaData {
    pub name: String,
    pub kind: TeamKind,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct RawManagedObjectMetaData<'c> {
    pub config: &'c ManagedObjectConfig,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RawFunctionMetaData<'c> {
    pub config: &'c FunctionConfig,
    /// Resolved team name (`None` once reported unknown)
    pub team: Option<String>,
    pub function_objects: Vec<RawManagedObjectMetaData<'c>>,
}

#[derive(Debug, Clone)]
pub struct RawAdministrationMetaData<'c> {
    pub config: &'c AdministrationConfig,
}

#[derive(Debug, Clone)]
pub struct RawGovernanceMetaData<'c> {
    pub config: &'c GovernanceConfig,
}

#[derive(Debug, Clone)]
pub struct RawEscalationTypeMetaData<'c> {
    pub config: &'c EscalationTypeConfig,
    /// Parent to link (`None` for the root or a reported self-parent)
    pub parent: Option<&'c str>,
}

/// Validated, defaulted, but still name-linked metadata
#[derive(Debug, Clone)]
pub enum RawMetaData<'c> {
    Team(RawTeamMetaData),
    ManagedObject(RawManagedObjectMetaData<'c>),
    Function(RawFunctionMetaData<'c>),
    Administration(RawAdministrationMetaData<'c>),
    Governance(RawGovernanceMetaData<'c>),
    EscalationType(RawEscalationTypeMetaData<'c>),
    OfficeEscalation(&'c EscalationConfig),
}

/// Run the factory for one declaration
pub fn construct<'c>(
    node: &'c ConfigNode,
    ctx: &RawContext<'_>,
    issues: &mut IssueCollector,
) -> Option<RawMetaData<'c>> {
    if node.name().trim().is_empty() {
        invalid(issues, "<unnamed>", format!("{} declared without a name", node.namespace()));
        return None;
    }
    match node {
        ConfigNode::Team(team) => Some(RawMetaData::Team(raw_team(team, ctx, issues))),
        ConfigNode::ManagedObject(object) => Some(RawMetaData::ManagedObject(raw_office_object(
            object, ctx, issues,
        ))),
        ConfigNode::Function(function) => {
            Some(RawMetaData::Function(raw_function(function, ctx, issues)))
        }
        ConfigNode::Administration(admin) => {
            Some(RawMetaData::Administration(raw_administration(admin, issues)))
        }
        ConfigNode::Governance(governance) => {
            Some(RawMetaData::Governance(raw_governance(governance, issues)))
        }
        ConfigNode::EscalationType(escalation_type) => {
            raw_escalation_type(escalation_type, issues).map(RawMetaData::EscalationType)
        }
        ConfigNode::OfficeEscalation(escalation) => {
            raw_escalation(escalation, "office", issues).then_some(RawMetaData::OfficeEscalation(escalation))
        }
    }
}

fn invalid(
    issues: &mut IssueCollector,
    source: &str,
    message: impl Into<String>,
) {
    issues.report(
        IssueCode::INVALID_CONFIGURATION
            .builder()
            .param("message", message)
            .against(source)
            .build(),
    );
}

fn raw_team(
    team: &TeamConfig,
    ctx: &RawContext<'_>,
    issues: &mut IssueCollector,
) -> RawTeamMetaData {
    let workers = match &team.kind {
        TeamKind::Executor { workers: Some(0) } => {
            invalid(issues, &team.name, "executor team needs at least one worker");
            0
        }
        TeamKind::Executor { workers: Some(n) } => *n,
        TeamKind::Executor { workers: None } => ctx.config.default_team_workers.max(1),
        TeamKind::Passive | TeamKind::Custom(_) => 0,
    };
    RawTeamMetaData {
        name: team.name.clone(),
        kind: team.kind.clone(),
        workers,
    }
}

fn raw_object<'c>(
    object: &'c ManagedObjectConfig,
    ctx: &RawContext<'_>,
    issues: &mut IssueCollector,
) -> RawManagedObjectMetaData<'c> {
    if object.exclusive && object.scope != Scope::Process {
        invalid(
            issues,
            &object.name,
            format!("only process objects may be exclusive, not {} objects", object.scope),
        );
    }
    let timeout = match object.timeout {
        Some(Duration::ZERO) => {
            invalid(issues, &object.name, "object timeout must be greater than zero");
            ctx.config.default_object_timeout()
        }
        Some(timeout) => timeout,
        None => ctx.config.default_object_timeout(),
    };
    if object.qualifier.is_some() && object.object_type.is_none() {
        invalid(issues, &object.name, "qualifier given without an object type");
    }
    RawManagedObjectMetaData {
        config: object,
        timeout,
    }
}

fn raw_office_object<'c>(
    object: &'c ManagedObjectConfig,
    ctx: &RawContext<'_>,
    issues: &mut IssueCollector,
) -> RawManagedObjectMetaData<'c> {
    if object.scope == Scope::Function {
        invalid(
            issues,
            &object.name,
            "function objects are declared on the function that uses them",
        );
    }
    raw_object(object, ctx, issues)
}

fn raw_function<'c>(
    function: &'c FunctionConfig,
    ctx: &RawContext<'_>,
    issues: &mut IssueCollector,
) -> RawFunctionMetaData<'c> {
    let team = function.team.as_deref().unwrap_or(ctx.default_team);
    let team = if ctx.teams.iter().any(|t| t == team) {
        Some(team.to_string())
    } else {
        issues.report(
            IssueCode::UNRESOLVED_REFERENCE
                .builder()
                .param("what", "team")
                .param("name", team)
                .against(&function.name)
                .build(),
        );
        None
    };

    let mut seen = HashSet::new();
    let mut function_objects = Vec::with_capacity(function.function_objects.len());
    for object in &function.function_objects {
        let source = format!("{}.{}", function.name, object.name);
        if object.scope != Scope::Function {
            invalid(
                issues,
                &source,
                format!("{} objects are declared on the office", object.scope),
            );
        }
        if !seen.insert(object.name.as_str()) {
            issues.report(
                IssueCode::DUPLICATE_NAME
                    .builder()
                    .param("namespace", "function object")
                    .param("name", &object.name)
                    .against(&function.name)
                    .build(),
            );
            continue;
        }
        function_objects.push(raw_object(object, ctx, issues));
    }

    let mut flows = HashSet::new();
    for flow in &function.flows {
        if !flows.insert(flow.name.as_str()) {
            issues.report(
                IssueCode::DUPLICATE_NAME
                    .builder()
                    .param("namespace", "flow")
                    .param("name", &flow.name)
                    .against(&function.name)
                    .build(),
            );
        }
    }

    for escalation in &function.escalations {
        raw_escalation(escalation, &function.name, issues);
    }

    RawFunctionMetaData {
        config: function,
        team,
        function_objects,
    }
}

fn raw_escalation(
    escalation: &EscalationConfig,
    source: &str,
    issues: &mut IssueCollector,
) -> bool {
    if escalation.handler.trim().is_empty() {
        invalid(
            issues,
            source,
            format!("handler for '{}' has no function name", escalation.escalation_type),
        );
        return false;
    }
    true
}

fn raw_administration<'c>(
    admin: &'c AdministrationConfig,
    issues: &mut IssueCollector,
) -> RawAdministrationMetaData<'c> {
    if admin.extension.trim().is_empty() {
        invalid(issues, &admin.name, "administration needs an extension interface");
    }
    RawAdministrationMetaData { config: admin }
}

fn raw_governance<'c>(
    governance: &'c GovernanceConfig,
    issues: &mut IssueCollector,
) -> RawGovernanceMetaData<'c> {
    if governance.extension.trim().is_empty() {
        invalid(issues, &governance.name, "governance needs an extension interface");
    }
    RawGovernanceMetaData { config: governance }
}

fn raw_escalation_type<'c>(
    escalation_type: &'c EscalationTypeConfig,
    issues: &mut IssueCollector,
) -> Option<RawEscalationTypeMetaData<'c>> {
    let name = escalation_type.name.as_str();
    if name == Escalation::EXCEPTION || Escalation::BUILT_IN.contains(&name) {
        issues.report(
            IssueCode::DUPLICATE_NAME
                .builder()
                .param("namespace", "escalation type")
                .param("name", name)
                .against(name)
                .build(),
        );
        return None;
    }
    let mut parent = escalation_type.parent.as_deref();
    if parent == Some(name) {
        issues.report(
            IssueCode::ESCALATION_HIERARCHY_CYCLE
                .builder()
                .param("path", format!("{} -> {}", name, name))
                .against(name)
                .build(),
        );
        parent = None;
    }
    Some(RawEscalationTypeMetaData {
        config: escalation_type,
        parent,
    })
}
