//! Escalation type hierarchy and handler selection

use std::collections::HashMap;

use super::{EscalationFlow, EscalationTypeIndex};
use crate::model::Escalation;

/// One bound escalation type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTypeMetaData {
    pub name: String,
    /// `None` only for the root
    pub parent: Option<EscalationTypeIndex>,
}

/// The office's escalation type tree, rooted at [`Escalation::EXCEPTION`].
///
/// Index 0 is always the root, followed by the built-in kinds and then the
/// declared types in declaration order. Kinds that were never declared are
/// treated as direct children of the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationHierarchy {
    types: Vec<EscalationTypeMetaData>,
    by_name: HashMap<String, EscalationTypeIndex>,
}

impl Default for EscalationHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationHierarchy {
    /// Root index
    pub const ROOT: EscalationTypeIndex = EscalationTypeIndex(0);

    /// Hierarchy holding the root and the built-in kinds
    pub fn new() -> Self {
        let mut hierarchy = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        hierarchy.push(Escalation::EXCEPTION, None);
        for kind in Escalation::BUILT_IN {
            hierarchy.push(kind, Some(Self::ROOT));
        }
        hierarchy
    }

    /// Add a type; the parent is linked later with [`Self::set_parent`]
    pub fn push(
        &mut self,
        name: &str,
        parent: Option<EscalationTypeIndex>,
    ) -> EscalationTypeIndex {
        let index = EscalationTypeIndex(self.types.len());
        self.types.push(EscalationTypeMetaData {
            name: name.to_string(),
            parent,
        });
        self.by_name.insert(name.to_string(), index);
        index
    }

    pub fn set_parent(
        &mut self,
        index: EscalationTypeIndex,
        parent: Option<EscalationTypeIndex>,
    ) {
        self.types[index.0].parent = parent;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[inline]
    pub fn get(
        &self,
        index: EscalationTypeIndex,
    ) -> &EscalationTypeMetaData {
        &self.types[index.0]
    }

    /// Index of a declared (or built-in) type
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<EscalationTypeIndex> {
        self.by_name.get(name).copied()
    }

    /// Ancestor path from `index` up to the root, `index` first.
    ///
    /// Stops early if a parent loop is met; the linker rejects those, so a
    /// bound hierarchy always reaches the root.
    pub fn ancestry(
        &self,
        index: EscalationTypeIndex,
    ) -> Vec<EscalationTypeIndex> {
        let mut path = vec![index];
        let mut current = self.types[index.0].parent;
        while let Some(parent) = current {
            if path.contains(&parent) {
                break;
            }
            path.push(parent);
            current = self.types[parent.0].parent;
        }
        path
    }

    /// Find the first type on the parent chain of `index` that repeats.
    pub fn find_loop(
        &self,
        index: EscalationTypeIndex,
    ) -> Option<Vec<EscalationTypeIndex>> {
        let mut path = vec![index];
        let mut current = self.types[index.0].parent;
        while let Some(parent) = current {
            if let Some(pos) = path.iter().position(|p| *p == parent) {
                let mut cycle = path.split_off(pos);
                cycle.push(parent);
                return Some(cycle);
            }
            path.push(parent);
            current = self.types[parent.0].parent;
        }
        None
    }

    /// Number of parent steps from `kind` up to `ancestor`, if `ancestor` is
    /// on the chain. Unknown kinds sit one step below the root.
    pub fn distance(
        &self,
        kind: &str,
        ancestor: EscalationTypeIndex,
    ) -> Option<usize> {
        match self.lookup(kind) {
            Some(index) => self.ancestry(index).iter().position(|i| *i == ancestor),
            None if ancestor == Self::ROOT => Some(1),
            None => None,
        }
    }

    /// Check whether `kind` is `ancestor` or one of its descendants
    pub fn is_a(
        &self,
        kind: &str,
        ancestor: EscalationTypeIndex,
    ) -> bool {
        self.distance(kind, ancestor).is_some()
    }

    /// Pick the handler whose type is the most specific ancestor of the
    /// escalation's kind. Ties go to the earliest declared handler.
    pub fn select<'a>(
        &self,
        handlers: &'a [EscalationFlow],
        escalation: &Escalation,
    ) -> Option<&'a EscalationFlow> {
        handlers
            .iter()
            .filter_map(|flow| {
                self.distance(escalation.kind(), flow.escalation_type)
                    .map(|distance| (distance, flow))
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, flow)| flow)
    }
}
