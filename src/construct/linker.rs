//! Two-pass linker
//!
//! Pass 1 walks the raw metadata and assigns every team, managed object,
//! function, administration, governance and escalation type its index, in
//! declaration order within its kind. Pass 2 replaces every name reference
//! with the index assigned in pass 1, checks scopes and declared types,
//! rejects managed object dependency cycles, and computes the order each
//! function loads its objects in.
//!
//! Flow references may form cycles (a function may eventually flow back to
//! itself); only object dependencies must be acyclic.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;

use super::graph::DependencyGraph;
use super::raw::{
    RawAdministrationMetaData, RawEscalationTypeMetaData, RawFunctionMetaData,
    RawGovernanceMetaData, RawManagedObjectMetaData, RawTeamMetaData,
};
use crate::model::{
    DependencyRef, EscalationConfig, ManagedObjectConfig, Scope, UnhandledEscalationHandler,
};
use crate::office::{
    AdministrationIndex, AdministrationMetaData, BoundAdministration, BoundGovernance,
    EscalationFlow, EscalationHierarchy, EscalationTypeIndex, FlowMetaData, FunctionIndex,
    FunctionMetaData, GovernanceIndex, GovernanceMetaData, ManagedObjectIndex,
    ManagedObjectMetaData, OfficeMetaData, TeamIndex, TeamMetaData,
};
use crate::util::diagnostic::{IssueCode, IssueCollector};

/// Raw metadata of one office, grouped by kind in declaration order
#[derive(Default)]
pub struct RawOffice<'c> {
    pub name: String,
    pub teams: Vec<RawTeamMetaData>,
    pub objects: Vec<RawManagedObjectMetaData<'c>>,
    pub functions: Vec<RawFunctionMetaData<'c>>,
    pub administrations: Vec<RawAdministrationMetaData<'c>>,
    pub governances: Vec<RawGovernanceMetaData<'c>>,
    pub escalation_types: Vec<RawEscalationTypeMetaData<'c>>,
    pub office_escalations: Vec<&'c EscalationConfig>,
    pub unhandled: Option<Arc<dyn UnhandledEscalationHandler>>,
}

/// A managed object visible to name resolution
#[derive(Clone, Copy)]
struct ObjectView<'c> {
    config: &'c ManagedObjectConfig,
    index: ManagedObjectIndex,
}

/// Link raw metadata into bound office metadata.
///
/// Returns `None` when any error was reported; the collector then holds
/// every issue found, not only the first.
pub fn link(
    raw: RawOffice<'_>,
    issues: &mut IssueCollector,
) -> Option<OfficeMetaData> {
    let mut linker = Linker::assign_indices(&raw, issues);
    let metadata = linker.resolve(&raw);
    if issues.has_errors() {
        tracing::debug!(
            "office '{}' failed to link with {} error(s)",
            raw.name,
            issues.error_count()
        );
        return None;
    }
    metadata
}

struct Linker<'c, 'i> {
    issues: &'i mut IssueCollector,
    teams: IndexMap<String, TeamIndex>,
    office_objects: Vec<ObjectView<'c>>,
    functions: IndexMap<String, FunctionIndex>,
    administrations: IndexMap<String, AdministrationIndex>,
    governances: IndexMap<String, GovernanceIndex>,
    hierarchy: EscalationHierarchy,
}

impl<'c, 'i> Linker<'c, 'i> {
    /// Pass 1: index assignment
    fn assign_indices(
        raw: &RawOffice<'c>,
        issues: &'i mut IssueCollector,
    ) -> Self {
        let teams = raw
            .teams
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), TeamIndex(i)))
            .collect();

        let mut thread_count = 0;
        let mut process_count = 0;
        let office_objects = raw
            .objects
            .iter()
            .map(|object| {
                // a function-scope object declared on the office was reported
                // already and is indexed as a thread object
                let scope = match object.config.scope {
                    Scope::Process => Scope::Process,
                    _ => Scope::Thread,
                };
                let counter = match scope {
                    Scope::Process => &mut process_count,
                    _ => &mut thread_count,
                };
                let index = ManagedObjectIndex::new(scope, *counter);
                *counter += 1;
                ObjectView {
                    config: object.config,
                    index,
                }
            })
            .collect();

        let functions = raw
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.config.name.clone(), FunctionIndex(i)))
            .collect();
        let administrations = raw
            .administrations
            .iter()
            .enumerate()
            .map(|(i, a)| (a.config.name.clone(), AdministrationIndex(i)))
            .collect();
        let governances = raw
            .governances
            .iter()
            .enumerate()
            .map(|(i, g)| (g.config.name.clone(), GovernanceIndex(i)))
            .collect();

        let mut hierarchy = EscalationHierarchy::new();
        for escalation_type in &raw.escalation_types {
            hierarchy.push(&escalation_type.config.name, None);
        }

        Self {
            issues,
            teams,
            office_objects,
            functions,
            administrations,
            governances,
            hierarchy,
        }
    }

    /// Pass 2: reference resolution and checks
    fn resolve(
        &mut self,
        raw: &RawOffice<'c>,
    ) -> Option<OfficeMetaData> {
        self.link_escalation_types(&raw.escalation_types);

        let mut thread_objects = Vec::new();
        let mut process_objects = Vec::new();
        let mut graph = DependencyGraph::new();
        for view in &self.office_objects {
            graph.add_node(view.index, view.config.name.clone());
        }
        for (raw_object, view) in raw.objects.iter().zip(self.office_objects.clone()) {
            let bound = self.bind_object(raw_object, &[], &view.config.name);
            for dependency in &bound.dependencies {
                let _ = graph.add_edge(view.index, *dependency);
            }
            match view.index.scope {
                Scope::Process => process_objects.push(bound),
                _ => thread_objects.push(bound),
            }
        }
        for cycle in graph.find_cycles() {
            self.report_cycle(&graph, &cycle);
        }

        let teams = raw
            .teams
            .iter()
            .map(|t| TeamMetaData {
                name: t.name.clone(),
                kind: t.kind.clone(),
                workers: t.workers,
            })
            .collect();

        let administrations = raw
            .administrations
            .iter()
            .map(|a| AdministrationMetaData {
                name: a.config.name.clone(),
                extension: a.config.extension.clone(),
                duty: a.config.duty.clone(),
            })
            .collect::<Vec<_>>();
        let governances = raw
            .governances
            .iter()
            .map(|g| GovernanceMetaData {
                name: g.config.name.clone(),
                extension: g.config.extension.clone(),
                governance: g.config.governance.clone(),
            })
            .collect::<Vec<_>>();

        let functions = raw
            .functions
            .iter()
            .map(|function| {
                self.bind_function(
                    function,
                    raw,
                    &graph,
                    &thread_objects,
                    &process_objects,
                )
            })
            .collect::<Vec<_>>();

        let mut office_escalations = Vec::new();
        for escalation in &raw.office_escalations {
            if let Some(flow) = self.bind_escalation(escalation, "office", raw) {
                office_escalations.push(flow);
            }
        }

        let functions: Vec<FunctionMetaData> = functions.into_iter().flatten().collect();
        if functions.len() != raw.functions.len() {
            return None;
        }

        Some(OfficeMetaData {
            name: raw.name.clone(),
            teams,
            functions,
            function_names: self.functions.clone(),
            thread_objects,
            process_objects,
            administrations,
            governances,
            escalation_types: self.hierarchy.clone(),
            office_escalations,
            unhandled: raw.unhandled.clone(),
        })
    }

    fn link_escalation_types(
        &mut self,
        declared: &[RawEscalationTypeMetaData<'c>],
    ) {
        for escalation_type in declared {
            let Some(index) = self.hierarchy.lookup(&escalation_type.config.name) else {
                continue;
            };
            let parent = match escalation_type.parent {
                None => EscalationHierarchy::ROOT,
                Some(parent) => match self.hierarchy.lookup(parent) {
                    Some(parent) => parent,
                    None => {
                        self.unresolved("escalation type", parent, &escalation_type.config.name);
                        EscalationHierarchy::ROOT
                    }
                },
            };
            self.hierarchy.set_parent(index, Some(parent));
        }

        let mut reported: Vec<BTreeSet<EscalationTypeIndex>> = Vec::new();
        for escalation_type in declared {
            let Some(index) = self.hierarchy.lookup(&escalation_type.config.name) else {
                continue;
            };
            let Some(cycle) = self.hierarchy.find_loop(index) else {
                continue;
            };
            let members: BTreeSet<_> = cycle.iter().copied().collect();
            if reported.contains(&members) {
                continue;
            }
            let path = cycle
                .iter()
                .map(|i| self.hierarchy.get(*i).name.clone())
                .collect::<Vec<_>>()
                .join(" -> ");
            let source = self.hierarchy.get(cycle[0]).name.clone();
            self.issues.report(
                IssueCode::ESCALATION_HIERARCHY_CYCLE
                    .builder()
                    .param("path", path)
                    .against(source)
                    .build(),
            );
            reported.push(members);
        }
    }

    fn unresolved(
        &mut self,
        what: &str,
        name: &str,
        source: &str,
    ) {
        self.issues.report(
            IssueCode::UNRESOLVED_REFERENCE
                .builder()
                .param("what", what)
                .param("name", name)
                .against(source)
                .build(),
        );
    }

    fn mismatch(
        &mut self,
        what: String,
        expected: &str,
        found: &str,
        source: &str,
    ) {
        self.issues.report(
            IssueCode::TYPE_MISMATCH
                .builder()
                .param("what", what)
                .param("expected", expected)
                .param("found", found)
                .against(source)
                .build(),
        );
    }

    fn report_cycle(
        &mut self,
        graph: &DependencyGraph<ManagedObjectIndex>,
        cycle: &[ManagedObjectIndex],
    ) {
        let source = graph
            .node(cycle[0])
            .map(|n| n.label().to_string())
            .unwrap_or_default();
        self.issues.report(
            IssueCode::DEPENDENCY_CYCLE
                .builder()
                .param("path", graph.describe(cycle))
                .against(source)
                .build(),
        );
    }

    /// Resolve a dependency, searching `local` (function objects) before the
    /// office objects
    fn resolve_object(
        &mut self,
        dependency: &DependencyRef,
        local: &[ObjectView<'c>],
        source: &str,
    ) -> Option<ObjectView<'c>> {
        match dependency {
            DependencyRef::Named(name) => {
                let found = local
                    .iter()
                    .chain(&self.office_objects)
                    .find(|v| v.config.name == *name)
                    .copied();
                if found.is_none() {
                    self.unresolved("managed object", name, source);
                }
                found
            }
            DependencyRef::Typed {
                type_name,
                qualifier,
            } => {
                let candidates: Vec<ObjectView<'c>> = local
                    .iter()
                    .chain(&self.office_objects)
                    .filter(|v| v.config.satisfies(type_name, qualifier.as_deref()))
                    .copied()
                    .collect();
                match candidates.len() {
                    0 => {
                        self.unresolved("managed object of type", &dependency.to_string(), source);
                        None
                    }
                    1 => Some(candidates[0]),
                    _ => {
                        let names = candidates
                            .iter()
                            .map(|v| format!("'{}'", v.config.name))
                            .collect::<Vec<_>>()
                            .join(", ");
                        self.issues.report(
                            IssueCode::AMBIGUOUS_QUALIFIER
                                .builder()
                                .param("type_name", dependency.to_string())
                                .param("candidates", names)
                                .against(source)
                                .build(),
                        );
                        None
                    }
                }
            }
        }
    }

    fn bind_object(
        &mut self,
        raw: &RawManagedObjectMetaData<'c>,
        local: &[ObjectView<'c>],
        label: &str,
    ) -> ManagedObjectMetaData {
        let config = raw.config;
        let mut dependencies = Vec::with_capacity(config.dependencies.len());
        for dependency in &config.dependencies {
            let Some(view) = self.resolve_object(dependency, local, label) else {
                continue;
            };
            if view.index.scope < config.scope {
                self.issues.report(
                    IssueCode::SCOPE_MISMATCH
                        .builder()
                        .param("scope", config.scope.to_string())
                        .param("object", &config.name)
                        .param("dependency_scope", view.index.scope.to_string())
                        .param("dependency", &view.config.name)
                        .against(label)
                        .build(),
                );
                continue;
            }
            dependencies.push(view.index);
        }
        ManagedObjectMetaData {
            name: config.name.clone(),
            scope: config.scope,
            object_type: config.object_type.clone(),
            dependencies,
            extensions: config.extensions.clone(),
            exclusive: config.exclusive,
            timeout: raw.timeout,
            source: config.source.clone(),
        }
    }

    fn bind_escalation(
        &mut self,
        escalation: &EscalationConfig,
        source: &str,
        raw: &RawOffice<'c>,
    ) -> Option<EscalationFlow> {
        let escalation_type = self.hierarchy.lookup(&escalation.escalation_type);
        if escalation_type.is_none() {
            self.unresolved("escalation type", &escalation.escalation_type, source);
        }
        let handler = self.functions.get(&escalation.handler).copied();
        if handler.is_none() {
            self.unresolved("function", &escalation.handler, source);
        }
        let (escalation_type, handler) = (escalation_type?, handler?);

        if let Some(parameter) = raw.functions[handler.0].config.parameter_type.as_deref() {
            let accepts = self
                .hierarchy
                .lookup(parameter)
                .map(|p| self.hierarchy.is_a(&escalation.escalation_type, p))
                .unwrap_or(false);
            if !accepts {
                self.mismatch(
                    format!("handler '{}' parameter", escalation.handler),
                    &escalation.escalation_type,
                    parameter,
                    source,
                );
            }
        }

        Some(EscalationFlow {
            escalation_type,
            handler,
        })
    }

    fn bind_administrations(
        &mut self,
        names: &[String],
        local: &[ObjectView<'c>],
        raw: &RawOffice<'c>,
        source: &str,
    ) -> Vec<BoundAdministration> {
        let mut bound = Vec::with_capacity(names.len());
        for name in names {
            let Some(index) = self.administrations.get(name).copied() else {
                self.unresolved("administration", name, source);
                continue;
            };
            let config = raw.administrations[index.0].config;
            let mut objects = Vec::with_capacity(config.administer.len());
            for dependency in &config.administer {
                let Some(view) = self.resolve_object(dependency, local, source) else {
                    continue;
                };
                let checked = !config.extension.trim().is_empty();
                if checked && !view.config.extensions.contains(&config.extension) {
                    let found = if view.config.extensions.is_empty() {
                        "no extension".to_string()
                    } else {
                        view.config.extensions.join(", ")
                    };
                    self.mismatch(
                        format!(
                            "object '{}' administered by '{}'",
                            view.config.name, config.name
                        ),
                        &config.extension,
                        &found,
                        source,
                    );
                    continue;
                }
                objects.push(view.index);
            }
            bound.push(BoundAdministration {
                administration: index,
                objects,
            });
        }
        bound
    }

    fn bind_function(
        &mut self,
        raw_function: &RawFunctionMetaData<'c>,
        raw: &RawOffice<'c>,
        office_graph: &DependencyGraph<ManagedObjectIndex>,
        thread_objects: &[ManagedObjectMetaData],
        process_objects: &[ManagedObjectMetaData],
    ) -> Option<FunctionMetaData> {
        let config = raw_function.config;
        let name = config.name.as_str();

        // an unknown team was reported by the raw factory
        let team = raw_function.team.as_ref().and_then(|team| {
            let index = self.teams.get(team).copied();
            if index.is_none() {
                self.unresolved("team", team, name);
            }
            index
        });

        let local: Vec<ObjectView<'c>> = raw_function
            .function_objects
            .iter()
            .enumerate()
            .map(|(i, o)| ObjectView {
                config: o.config,
                index: ManagedObjectIndex::new(Scope::Function, i),
            })
            .collect();

        let function_objects: Vec<ManagedObjectMetaData> = raw_function
            .function_objects
            .iter()
            .map(|o| {
                let label = format!("{}.{}", name, o.config.name);
                self.bind_object(o, &local, &label)
            })
            .collect();

        let mut objects = Vec::with_capacity(config.objects.len());
        for dependency in &config.objects {
            if let Some(view) = self.resolve_object(dependency, &local, name) {
                objects.push(view.index);
            }
        }

        let pre_administration =
            self.bind_administrations(&config.pre_administration, &local, raw, name);
        let post_administration =
            self.bind_administrations(&config.post_administration, &local, raw, name);

        // object load order over office objects plus this function's own
        let mut graph = office_graph.clone();
        for view in &local {
            graph.add_node(view.index, format!("{}.{}", name, view.config.name));
        }
        for (view, bound) in local.iter().zip(&function_objects) {
            for dependency in &bound.dependencies {
                let _ = graph.add_edge(view.index, *dependency);
            }
        }
        for cycle in graph.find_cycles() {
            if cycle.iter().any(|i| i.scope == Scope::Function) {
                self.report_cycle(&graph, &cycle);
            }
        }
        let roots: Vec<ManagedObjectIndex> = objects
            .iter()
            .chain(local.iter().map(|v| &v.index))
            .chain(
                pre_administration
                    .iter()
                    .chain(&post_administration)
                    .flat_map(|a| &a.objects),
            )
            .copied()
            .collect();
        let required_objects = graph.load_order(&roots);

        let object_meta = |index: &ManagedObjectIndex| -> Option<&ManagedObjectMetaData> {
            match index.scope {
                Scope::Function => function_objects.get(index.index),
                Scope::Thread => thread_objects.get(index.index),
                Scope::Process => process_objects.get(index.index),
            }
        };

        let mut exclusive_objects: Vec<usize> = required_objects
            .iter()
            .filter(|i| i.scope == Scope::Process)
            .filter(|i| object_meta(i).map(|m| m.exclusive).unwrap_or(false))
            .map(|i| i.index)
            .collect();
        exclusive_objects.sort_unstable();

        let mut governance = Vec::with_capacity(config.governance.len());
        for governance_name in &config.governance {
            let Some(index) = self.governances.get(governance_name).copied() else {
                self.unresolved("governance", governance_name, name);
                continue;
            };
            let extension = &raw.governances[index.0].config.extension;
            let enrolled = required_objects
                .iter()
                .filter(|i| object_meta(i).map(|m| m.has_extension(extension)).unwrap_or(false))
                .copied()
                .collect();
            governance.push(BoundGovernance {
                governance: index,
                enrolled,
            });
        }
        let mut flows = Vec::with_capacity(config.flows.len());
        for flow in &config.flows {
            let Some(target) = self.functions.get(&flow.function).copied() else {
                self.unresolved("function", &flow.function, name);
                continue;
            };
            let target_type = raw.functions[target.0].config.parameter_type.as_deref();
            if let (Some(argument), Some(parameter)) = (flow.argument_type.as_deref(), target_type) {
                if argument != parameter {
                    self.mismatch(format!("flow '{}' argument", flow.name), parameter, argument, name);
                }
            }
            flows.push(FlowMetaData {
                name: flow.name.clone(),
                target,
                spawn_thread: flow.spawn_thread,
            });
        }

        let next = match config.next.as_deref() {
            None => None,
            Some(next_name) => match self.functions.get(next_name).copied() {
                Some(next) => {
                    let next_type = raw.functions[next.0].config.parameter_type.as_deref();
                    if let (Some(returned), Some(parameter)) = (config.return_type.as_deref(), next_type) {
                        if returned != parameter {
                            self.mismatch(
                                format!("next function '{}' parameter", next_name),
                                parameter,
                                returned,
                                name,
                            );
                        }
                    }
                    Some(next)
                }
                None => {
                    self.unresolved("function", next_name, name);
                    None
                }
            },
        };

        let mut escalations = Vec::with_capacity(config.escalations.len());
        for escalation in config.escalations.iter().filter(|e| !e.handler.trim().is_empty()) {
            if let Some(flow) = self.bind_escalation(escalation, name, raw) {
                escalations.push(flow);
            }
        }
        for declared in &config.declared_escalations {
            if self.hierarchy.lookup(declared).is_none() {
                self.unresolved("escalation type", declared, name);
            }
        }

        Some(FunctionMetaData {
            name: config.name.clone(),
            team: team?,
            parameter_type: config.parameter_type.clone(),
            objects,
            function_objects,
            required_objects,
            exclusive_objects,
            flows,
            next,
            escalations,
            governance,
            pre_administration,
            post_administration,
            body: config.body.clone(),
        })
    }
}
