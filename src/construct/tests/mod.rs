//! Construction tests

use super::*;
use crate::model::{
    object, AdministrationConfig, DependencyRef, FlowConfig, FunctionConfig, GovernanceConfig,
    ManagedObjectConfig, Object, Scope,
};
use crate::office::{FunctionIndex, ManagedObjectIndex};
use crate::util::diagnostic::{IssueKind, Severity};

fn noop(name: &str) -> FunctionConfig {
    FunctionConfig::new(name, |_ctx| Ok(None))
}

fn value(name: &str, scope: Scope) -> ManagedObjectConfig {
    ManagedObjectConfig::from_fn(name, scope, |_deps: &[Object]| Ok(object(1u32)))
}

fn compile(config: &OfficeConfig) -> Result<Compiled, ConstructionError> {
    OfficeBuilder::new().compile(config)
}

fn kinds(err: &ConstructionError) -> Vec<IssueKind> {
    err.issues().iter().map(|i| i.kind).collect()
}

#[cfg(test)]
mod graph_tests {
    use super::*;

    #[test]
    fn test_find_single_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_node(0usize, "x");
        graph.add_node(1usize, "y");
        graph.add_edge(0, 1).unwrap();
        graph.add_edge(1, 0).unwrap();
        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(graph.describe(&cycles[0]), "x -> y -> x");
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let mut graph = DependencyGraph::new();
        for (id, label) in ["a", "b", "c"].iter().enumerate() {
            graph.add_node(id, *label);
        }
        graph.add_edge(0, 1).unwrap();
        graph.add_edge(0, 2).unwrap();
        graph.add_edge(1, 2).unwrap();
        assert!(graph.find_cycles().is_empty());
    }

    #[test]
    fn test_edge_to_unknown_node() {
        let mut graph = DependencyGraph::new();
        graph.add_node(0usize, "a");
        assert_eq!(graph.add_edge(0, 7), Err(GraphError::NodeNotFound("7".to_string())));
    }

    #[test]
    fn test_load_order_puts_dependencies_first() {
        let mut graph = DependencyGraph::new();
        graph.add_node(0usize, "app");
        graph.add_node(1usize, "pool");
        graph.add_node(2usize, "config");
        graph.add_edge(0, 1).unwrap();
        graph.add_edge(1, 2).unwrap();
        graph.add_edge(0, 2).unwrap();
        assert_eq!(graph.load_order(&[0]), vec![2, 1, 0]);
        assert_eq!(graph.load_order(&[1, 0]), vec![2, 1, 0]);
    }

    #[test]
    fn test_node_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_node(0usize, "a");
        graph.add_node(1usize, "b");
        graph.add_edge(0, 1).unwrap();
        graph.add_edge(0, 1).unwrap();
        let a = graph.node(0).unwrap();
        assert_eq!(a.dependencies(), &[1]);
        assert!(!a.is_root());
        assert_eq!(graph.node(1).unwrap().dependents(), &[0]);
    }
}

#[cfg(test)]
mod raw_tests {
    use super::*;
    use crate::model::TeamConfig;

    #[test]
    fn test_zero_worker_team_is_invalid() {
        let config = OfficeConfig::new("o").team(TeamConfig::executor("T", 0));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::InvalidConfiguration]);
    }

    #[test]
    fn test_function_with_unknown_team() {
        let config = OfficeConfig::new("o")
            .team(TeamConfig::passive("T1"))
            .function(noop("F").team("T2"));
        let err = compile(&config).unwrap_err();
        let issue = &err.issues()[0];
        assert_eq!(issue.kind, IssueKind::UnresolvedReference);
        assert_eq!(issue.source, "F");
        assert_eq!(issue.message, "unknown team 'T2'");
    }

    #[test]
    fn test_implicit_passive_team() {
        let compiled = compile(&OfficeConfig::new("o").function(noop("F"))).unwrap();
        assert_eq!(compiled.metadata.teams.len(), 1);
        assert_eq!(compiled.metadata.teams[0].name, IMPLICIT_TEAM);
    }

    #[test]
    fn test_default_team_is_first_declared() {
        let config = OfficeConfig::new("o")
            .team(TeamConfig::executor("A", 1))
            .team(TeamConfig::passive("B"))
            .function(noop("F"));
        let compiled = compile(&config).unwrap();
        assert_eq!(compiled.metadata.functions[0].team.0, 0);
    }

    #[test]
    fn test_exclusive_thread_object_is_invalid() {
        let config = OfficeConfig::new("o").managed_object(value("m", Scope::Thread).exclusive());
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::InvalidConfiguration]);
    }

    #[test]
    fn test_function_scope_object_at_office_level() {
        let config = OfficeConfig::new("o").managed_object(value("m", Scope::Function));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::InvalidConfiguration]);
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let config = OfficeConfig::new("o")
            .managed_object(value("m", Scope::Thread).timeout(std::time::Duration::ZERO));
        assert!(compile(&config).is_err());
    }

    #[test]
    fn test_function_with_unknown_team_is_still_linked() {
        let config = OfficeConfig::new("o")
            .team(TeamConfig::passive("T1"))
            .function(
                noop("a")
                    .team("missing")
                    .object(DependencyRef::named("nope"))
                    .next("ghost"),
            )
            .function(noop("b").next("a"));
        let err = compile(&config).unwrap_err();
        let issues: Vec<String> = err.issues().iter().map(|i| i.to_string()).collect();
        assert_eq!(
            issues,
            vec![
                "error[C0102] a: unknown team 'missing'",
                "error[C0102] a: unknown managed object 'nope'",
                "error[C0102] a: unknown function 'ghost'",
            ]
        );
    }

    #[test]
    fn test_invalid_declarations_do_not_cascade() {
        let config = OfficeConfig::new("o")
            .team(TeamConfig::executor("T", 0))
            .managed_object(value("m", Scope::Thread).exclusive())
            .administration(
                AdministrationConfig::new("audit", "", |_ext: &[Object]| Ok(()))
                    .administer(DependencyRef::named("m")),
            )
            .escalation_type("Loop", Some("Loop"))
            .function(
                noop("F")
                    .team("T")
                    .object(DependencyRef::named("m"))
                    .pre_administration("audit")
                    .declares_escalation("Loop"),
            );
        let err = compile(&config).unwrap_err();
        assert_eq!(
            kinds(&err),
            vec![
                IssueKind::InvalidConfiguration,
                IssueKind::InvalidConfiguration,
                IssueKind::InvalidConfiguration,
                IssueKind::EscalationHierarchyCycle,
            ]
        );
    }

    #[test]
    fn test_redeclaring_builtin_escalation_type() {
        let config = OfficeConfig::new("o").escalation_type("Exception", None);
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::DuplicateName]);
    }
}

#[cfg(test)]
mod link_tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_index_order() {
        let config = OfficeConfig::new("o")
            .managed_object(value("b", Scope::Thread))
            .managed_object(value("a", Scope::Thread))
            .managed_object(value("c", Scope::Thread))
            .function(noop("F"));
        let compiled = compile(&config).unwrap();
        let names: Vec<&str> = compiled
            .metadata
            .thread_objects
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_scopes_are_indexed_separately() {
        let config = OfficeConfig::new("o")
            .managed_object(value("t1", Scope::Thread))
            .managed_object(value("p1", Scope::Process))
            .managed_object(value("t2", Scope::Thread))
            .function(
                noop("F")
                    .object(DependencyRef::named("t2"))
                    .object(DependencyRef::named("p1")),
            );
        let compiled = compile(&config).unwrap();
        let function = &compiled.metadata.functions[0];
        assert_eq!(
            function.objects,
            vec![
                ManagedObjectIndex::new(Scope::Thread, 1),
                ManagedObjectIndex::new(Scope::Process, 0)
            ]
        );
    }

    #[test]
    fn test_unresolved_references_are_all_reported() {
        let config = OfficeConfig::new("o").function(
            noop("F")
                .object(DependencyRef::named("missing"))
                .flow(FlowConfig::new("out", "Nowhere"))
                .next("Gone"),
        );
        let err = compile(&config).unwrap_err();
        assert_eq!(err.issues().len(), 3);
        assert!(err
            .issues()
            .iter()
            .all(|i| i.kind == IssueKind::UnresolvedReference));
    }

    #[test]
    fn test_flow_cycles_are_allowed() {
        let config = OfficeConfig::new("o")
            .function(noop("A").flow(FlowConfig::new("toB", "B")))
            .function(noop("B").next("A"));
        let compiled = compile(&config).unwrap();
        assert_eq!(compiled.metadata.functions[0].flows[0].target, FunctionIndex(1));
        assert_eq!(compiled.metadata.functions[1].next, Some(FunctionIndex(0)));
        assert!(compiled.metadata.check_integrity().is_ok());
    }

    #[test]
    fn test_object_cycle_is_rejected() {
        let config = OfficeConfig::new("o")
            .managed_object(value("X", Scope::Thread).depends_on(DependencyRef::named("Y")))
            .managed_object(value("Y", Scope::Thread).depends_on(DependencyRef::named("X")));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::DependencyCycle]);
        assert!(err.issues()[0].message.contains("X -> Y -> X"));
    }

    #[test]
    fn test_function_object_cycle_is_rejected() {
        let config = OfficeConfig::new("o").function(
            noop("F")
                .function_object(value("x", Scope::Function).depends_on(DependencyRef::named("y")))
                .function_object(value("y", Scope::Function).depends_on(DependencyRef::named("x"))),
        );
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::DependencyCycle]);
    }

    #[test]
    fn test_scope_mismatch() {
        let config = OfficeConfig::new("o")
            .managed_object(value("thread", Scope::Thread))
            .managed_object(value("process", Scope::Process).depends_on(DependencyRef::named("thread")));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::ScopeMismatch]);
    }

    #[test]
    fn test_typed_dependency_needs_qualifier_when_ambiguous() {
        let config = OfficeConfig::new("o")
            .managed_object(value("primary", Scope::Process).object_type("DataSource").qualifier("primary"))
            .managed_object(value("replica", Scope::Process).object_type("DataSource").qualifier("replica"))
            .function(noop("F").object(DependencyRef::typed("DataSource")));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::AmbiguousQualifier]);

        let config = OfficeConfig::new("o")
            .managed_object(value("primary", Scope::Process).object_type("DataSource").qualifier("primary"))
            .managed_object(value("replica", Scope::Process).object_type("DataSource").qualifier("replica"))
            .function(noop("F").object(DependencyRef::qualified("DataSource", "replica")));
        let compiled = compile(&config).unwrap();
        assert_eq!(
            compiled.metadata.functions[0].objects,
            vec![ManagedObjectIndex::new(Scope::Process, 1)]
        );
    }

    #[test]
    fn test_required_objects_are_dependency_ordered() {
        let config = OfficeConfig::new("o")
            .managed_object(value("service", Scope::Thread).depends_on(DependencyRef::named("pool")))
            .managed_object(value("pool", Scope::Process))
            .function(
                noop("F")
                    .object(DependencyRef::named("service"))
                    .function_object(value("request", Scope::Function).depends_on(DependencyRef::named("service"))),
            );
        let compiled = compile(&config).unwrap();
        assert_eq!(
            compiled.metadata.functions[0].required_objects,
            vec![
                ManagedObjectIndex::new(Scope::Process, 0),
                ManagedObjectIndex::new(Scope::Thread, 0),
                ManagedObjectIndex::new(Scope::Function, 0),
            ]
        );
    }

    #[test]
    fn test_flow_argument_type_mismatch() {
        let config = OfficeConfig::new("o")
            .function(noop("A").flow(FlowConfig::new("out", "B").argument_type("String")))
            .function(noop("B").parameter_type("u32"));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::TypeMismatch]);
        assert_eq!(
            err.issues()[0].message,
            "flow 'out' argument: expected 'u32' but found 'String'"
        );
    }

    #[test]
    fn test_handler_parameter_must_accept_escalation() {
        let config = OfficeConfig::new("o")
            .escalation_type("IOException", None)
            .escalation_type("TimeoutException", None)
            .function(noop("Handler").parameter_type("TimeoutException"))
            .function(noop("F").escalation("IOException", "Handler"));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::TypeMismatch]);
    }

    #[test]
    fn test_escalation_hierarchy_cycle() {
        let config = OfficeConfig::new("o")
            .escalation_type("A", Some("B"))
            .escalation_type("B", Some("A"));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::EscalationHierarchyCycle]);
    }

    #[test]
    fn test_duplicate_function_is_a_warning() {
        let config = OfficeConfig::new("o")
            .function(noop("F").next("G"))
            .function(noop("F"))
            .function(noop("G"));
        let compiled = compile(&config).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.warnings[0].severity, Severity::Warning);
        assert_eq!(compiled.metadata.functions.len(), 2);
        // first declaration wins
        assert_eq!(compiled.metadata.functions[0].next, Some(FunctionIndex(1)));
    }

    #[test]
    fn test_duplicate_object_is_an_error() {
        let config = OfficeConfig::new("o")
            .managed_object(value("m", Scope::Thread))
            .managed_object(value("m", Scope::Process));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::DuplicateName]);
    }

    #[test]
    fn test_administration_needs_extension() {
        let config = OfficeConfig::new("o")
            .managed_object(value("plain", Scope::Thread))
            .administration(
                AdministrationConfig::new("audit", "Auditable", |_ext: &[Object]| Ok(()))
                    .administer(DependencyRef::named("plain")),
            )
            .function(noop("F").pre_administration("audit"));
        let err = compile(&config).unwrap_err();
        assert_eq!(kinds(&err), vec![IssueKind::TypeMismatch]);
    }

    #[test]
    fn test_governance_enrols_objects_with_extension() {
        struct Tx;
        impl crate::model::Governance for Tx {
            fn enforce(
                &self,
                _extensions: &[Object],
            ) -> Result<(), crate::model::Escalation> {
                Ok(())
            }
        }
        let config = OfficeConfig::new("o")
            .managed_object(value("plain", Scope::Thread))
            .managed_object(value("conn", Scope::Thread).extension("Transactional"))
            .governance(GovernanceConfig::new("tx", "Transactional", Tx))
            .function(
                noop("F")
                    .object(DependencyRef::named("plain"))
                    .object(DependencyRef::named("conn"))
                    .governed_by("tx"),
            );
        let compiled = compile(&config).unwrap();
        let governance = &compiled.metadata.functions[0].governance[0];
        assert_eq!(governance.enrolled, vec![ManagedObjectIndex::new(Scope::Thread, 1)]);
    }

    #[test]
    fn test_exclusive_objects_are_collected() {
        let config = OfficeConfig::new("o")
            .managed_object(value("shared", Scope::Process))
            .managed_object(value("lock", Scope::Process).exclusive())
            .function(
                noop("F")
                    .object(DependencyRef::named("shared"))
                    .object(DependencyRef::named("lock")),
            );
        let compiled = compile(&config).unwrap();
        assert_eq!(compiled.metadata.functions[0].exclusive_objects, vec![1]);
    }
}
