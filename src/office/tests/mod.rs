//! Bound metadata tests

use super::*;

#[cfg(test)]
mod hierarchy_tests {
    use super::*;
    use crate::model::Escalation;

    fn hierarchy() -> EscalationHierarchy {
        let mut hierarchy = EscalationHierarchy::new();
        let runtime = hierarchy.push("RuntimeException", Some(EscalationHierarchy::ROOT));
        hierarchy.push("IllegalArgumentException", Some(runtime));
        hierarchy
    }

    #[test]
    fn test_built_in_types_are_children_of_root() {
        let hierarchy = EscalationHierarchy::new();
        assert_eq!(hierarchy.get(EscalationHierarchy::ROOT).name, Escalation::EXCEPTION);
        for kind in Escalation::BUILT_IN {
            let index = hierarchy.lookup(kind).unwrap();
            assert_eq!(hierarchy.get(index).parent, Some(EscalationHierarchy::ROOT));
        }
    }

    #[test]
    fn test_distance_walks_parents() {
        let hierarchy = hierarchy();
        let runtime = hierarchy.lookup("RuntimeException").unwrap();
        assert_eq!(hierarchy.distance("IllegalArgumentException", runtime), Some(1));
        assert_eq!(
            hierarchy.distance("IllegalArgumentException", EscalationHierarchy::ROOT),
            Some(2)
        );
        assert_eq!(hierarchy.distance("RuntimeException", runtime), Some(0));
        assert_eq!(hierarchy.distance(Escalation::PANIC, runtime), None);
    }

    #[test]
    fn test_unknown_kind_is_a_child_of_root() {
        let hierarchy = hierarchy();
        assert!(hierarchy.is_a("SomethingElse", EscalationHierarchy::ROOT));
        let runtime = hierarchy.lookup("RuntimeException").unwrap();
        assert!(!hierarchy.is_a("SomethingElse", runtime));
    }

    #[test]
    fn test_select_prefers_most_specific() {
        let hierarchy = hierarchy();
        let runtime = hierarchy.lookup("RuntimeException").unwrap();
        let handlers = vec![
            EscalationFlow {
                escalation_type: EscalationHierarchy::ROOT,
                handler: FunctionIndex(0),
            },
            EscalationFlow {
                escalation_type: runtime,
                handler: FunctionIndex(1),
            },
        ];

        let escalation = Escalation::new("IllegalArgumentException", "bad");
        let chosen = hierarchy.select(&handlers, &escalation).unwrap();
        assert_eq!(chosen.handler, FunctionIndex(1));

        let escalation = Escalation::new(Escalation::PANIC, "boom");
        let chosen = hierarchy.select(&handlers, &escalation).unwrap();
        assert_eq!(chosen.handler, FunctionIndex(0));
    }

    #[test]
    fn test_select_without_match() {
        let hierarchy = hierarchy();
        let runtime = hierarchy.lookup("RuntimeException").unwrap();
        let handlers = vec![EscalationFlow {
            escalation_type: runtime,
            handler: FunctionIndex(0),
        }];
        let escalation = Escalation::new(Escalation::ASSET_TIMEOUT, "late");
        assert!(hierarchy.select(&handlers, &escalation).is_none());
    }

    #[test]
    fn test_find_loop() {
        let mut hierarchy = EscalationHierarchy::new();
        let a = hierarchy.push("A", None);
        let b = hierarchy.push("B", Some(a));
        hierarchy.set_parent(a, Some(b));
        let cycle = hierarchy.find_loop(a).unwrap();
        assert_eq!(cycle, vec![a, b, a]);
        assert!(hierarchy.find_loop(EscalationHierarchy::ROOT).is_none());
        // ancestry terminates despite the loop
        assert_eq!(hierarchy.ancestry(a), vec![a, b]);
    }
}

#[cfg(test)]
mod index_tests {
    use super::*;
    use crate::model::Scope;

    #[test]
    fn test_index_display() {
        assert_eq!(FunctionIndex(3).to_string(), "FunctionIndex(3)");
        assert_eq!(
            ManagedObjectIndex::new(Scope::Process, 2).to_string(),
            "process[2]"
        );
    }

    #[test]
    fn test_object_index_ordering() {
        let a = ManagedObjectIndex::new(Scope::Function, 5);
        let b = ManagedObjectIndex::new(Scope::Thread, 0);
        assert!(a < b);
    }
}
