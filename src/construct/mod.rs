//! Office construction
//!
//! Turns an [`OfficeConfig`] into bound [`OfficeMetaData`] and, from that, a
//! running [`Office`]:
//!
//! 1. duplicate names are detected per namespace (first declaration wins)
//! 2. each declaration runs through its raw metadata factory
//! 3. the linker assigns indices and resolves every reference
//!
//! Every phase reports into one [`IssueCollector`], so authors see all
//! problems at once. Any error-severity issue means no office is built.

pub mod graph;
pub mod linker;
pub mod raw;

pub use graph::{DependencyGraph, GraphError, GraphNode};
pub use raw::{RawContext, RawMetaData, IMPLICIT_TEAM};

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{ConfigNode, OfficeConfig, TeamConfig};
use crate::office::OfficeMetaData;
use crate::runtime::engine::Office;
use crate::runtime::team::TeamError;
use crate::util::config::RuntimeConfig;
use crate::util::diagnostic::{Issue, IssueCode, IssueCollector};
use linker::RawOffice;

#[cfg(test)]
mod tests;

/// Construction failed
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("office not built: {} error(s) found", .issues.iter().filter(|i| i.is_error()).count())]
    Invalid { issues: Vec<Issue> },

    #[error("office bound but could not start: {0}")]
    Team(#[from] TeamError),
}

impl ConstructionError {
    /// Issues collected during construction (empty for start-up failures)
    pub fn issues(&self) -> &[Issue] {
        match self {
            ConstructionError::Invalid { issues } => issues,
            ConstructionError::Team(_) => &[],
        }
    }
}

/// Bound metadata plus the non-fatal issues found while binding it
#[derive(Debug, Clone)]
pub struct Compiled {
    pub metadata: OfficeMetaData,
    pub warnings: Vec<Issue>,
}

/// Builds offices with a given runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct OfficeBuilder {
    config: RuntimeConfig,
}

impl OfficeBuilder {
    /// Builder using the default runtime configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder using an explicit runtime configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Validate and link `office` without starting anything.
    pub fn compile(
        &self,
        office: &OfficeConfig,
    ) -> Result<Compiled, ConstructionError> {
        let mut issues = IssueCollector::new();
        let metadata = self.bind(office, &mut issues);
        match metadata {
            Some(metadata) if !issues.has_errors() => Ok(Compiled {
                metadata,
                warnings: issues.into_issues(),
            }),
            _ => Err(ConstructionError::Invalid {
                issues: issues.into_issues(),
            }),
        }
    }

    /// Validate, link and start `office`.
    pub fn build(
        &self,
        office: &OfficeConfig,
    ) -> Result<Office, ConstructionError> {
        let compiled = self.compile(office)?;
        tracing::info!(
            "office '{}' bound: {} function(s), {} thread object(s), {} process object(s), {} team(s)",
            compiled.metadata.name,
            compiled.metadata.functions.len(),
            compiled.metadata.thread_objects.len(),
            compiled.metadata.process_objects.len(),
            compiled.metadata.teams.len()
        );
        let office = Office::start(compiled.metadata, self.config.clone(), compiled.warnings)?;
        Ok(office)
    }

    fn bind(
        &self,
        office: &OfficeConfig,
        issues: &mut IssueCollector,
    ) -> Option<OfficeMetaData> {
        let nodes = unique_nodes(office.nodes(), issues);

        // teams are needed by the function factory, so they go first
        let implicit;
        let mut team_nodes: Vec<&ConfigNode> = nodes
            .iter()
            .copied()
            .filter(|n| matches!(n, ConfigNode::Team(_)))
            .collect();
        if team_nodes.is_empty() {
            implicit = ConfigNode::Team(TeamConfig::passive(IMPLICIT_TEAM));
            team_nodes.push(&implicit);
        }
        let team_names: Vec<String> = team_nodes.iter().map(|n| n.name().to_string()).collect();
        let ctx = RawContext {
            config: &self.config,
            teams: &team_names,
            default_team: &team_names[0],
        };

        let mut raw = RawOffice {
            name: office.name().to_string(),
            unhandled: office.unhandled_escalation_handler().cloned(),
            ..RawOffice::default()
        };
        for node in team_nodes
            .into_iter()
            .chain(nodes.iter().copied().filter(|n| !matches!(n, ConfigNode::Team(_))))
        {
            match raw::construct(node, &ctx, issues) {
                Some(RawMetaData::Team(team)) => raw.teams.push(team),
                Some(RawMetaData::ManagedObject(object)) => raw.objects.push(object),
                Some(RawMetaData::Function(function)) => raw.functions.push(function),
                Some(RawMetaData::Administration(admin)) => raw.administrations.push(admin),
                Some(RawMetaData::Governance(governance)) => raw.governances.push(governance),
                Some(RawMetaData::EscalationType(escalation_type)) => {
                    raw.escalation_types.push(escalation_type)
                }
                Some(RawMetaData::OfficeEscalation(escalation)) => {
                    raw.office_escalations.push(escalation)
                }
                None => {}
            }
        }

        linker::link(raw, issues)
    }
}

/// Validate and start `office` with the default runtime configuration
pub fn build_office(office: &OfficeConfig) -> Result<Office, ConstructionError> {
    OfficeBuilder::new().build(office)
}

/// Drop later declarations of an already declared name.
///
/// Duplicate functions are reported as warnings, every other duplicate is
/// an error. Managed object names share one namespace across scopes.
fn unique_nodes<'c>(
    nodes: &'c [ConfigNode],
    issues: &mut IssueCollector,
) -> Vec<&'c ConfigNode> {
    let mut seen: HashSet<(&'static str, &str)> = HashSet::new();
    let mut unique = Vec::with_capacity(nodes.len());
    for node in nodes {
        if seen.insert((node.namespace(), node.name())) {
            unique.push(node);
            continue;
        }
        let builder = IssueCode::DUPLICATE_NAME
            .builder()
            .param("namespace", node.namespace())
            .param("name", node.name())
            .against(node.name());
        let issue = if matches!(node, ConfigNode::Function(_)) {
            builder.warning().build()
        } else {
            builder.build()
        };
        issues.report(issue);
    }
    unique
}
