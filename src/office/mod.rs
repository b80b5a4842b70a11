//! Bound office metadata
//!
//! The executable form produced by the linker. Every reference that was a
//! name in the configuration is an index into one of the parallel arrays of
//! [`OfficeMetaData`]; nothing here holds an unresolved name, and nothing
//! here is mutated after construction. All invocations share it.

pub mod escalation;

pub use escalation::{EscalationHierarchy, EscalationTypeMetaData};

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::model::{
    Administration, FunctionBody, Governance, ManagedObjectSource, Scope, TeamKind,
    UnhandledEscalationHandler,
};

#[cfg(test)]
mod tests;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);

        impl $name {
            /// Position in the owning array
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

index_type!(
    /// Index into [`OfficeMetaData::teams`]
    TeamIndex
);
index_type!(
    /// Index into [`OfficeMetaData::functions`]
    FunctionIndex
);
index_type!(
    /// Index into [`OfficeMetaData::administrations`]
    AdministrationIndex
);
index_type!(
    /// Index into [`OfficeMetaData::governances`]
    GovernanceIndex
);
index_type!(
    /// Index into the [`EscalationHierarchy`]
    EscalationTypeIndex
);

/// Identifies a managed object by scope and position within that scope.
///
/// Function-scope indices address the owning function's own object array and
/// mean nothing outside that function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagedObjectIndex {
    pub scope: Scope,
    pub index: usize,
}

impl ManagedObjectIndex {
    #[inline]
    pub fn new(
        scope: Scope,
        index: usize,
    ) -> Self {
        Self { scope, index }
    }
}

impl std::fmt::Display for ManagedObjectIndex {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}[{}]", self.scope, self.index)
    }
}

/// Bound team declaration; instances are created when the office starts.
#[derive(Debug, Clone)]
pub struct TeamMetaData {
    pub name: String,
    pub kind: TeamKind,
    /// Resolved worker count for executor teams
    pub workers: usize,
}

/// Bound managed object
#[derive(Clone)]
pub struct ManagedObjectMetaData {
    pub name: String,
    pub scope: Scope,
    pub object_type: Option<String>,
    /// Resolved dependencies in injection order
    pub dependencies: Vec<ManagedObjectIndex>,
    pub extensions: Vec<String>,
    pub exclusive: bool,
    pub timeout: Duration,
    pub source: Arc<dyn ManagedObjectSource>,
}

impl std::fmt::Debug for ManagedObjectMetaData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ManagedObjectMetaData")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("exclusive", &self.exclusive)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ManagedObjectMetaData {
    /// Check whether the object offers an extension interface
    pub fn has_extension(
        &self,
        extension: &str,
    ) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }
}

/// Bound flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMetaData {
    pub name: String,
    pub target: FunctionIndex,
    pub spawn_thread: bool,
}

/// Escalation type mapped to its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationFlow {
    pub escalation_type: EscalationTypeIndex,
    pub handler: FunctionIndex,
}

/// An administration applied to the objects of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAdministration {
    pub administration: AdministrationIndex,
    pub objects: Vec<ManagedObjectIndex>,
}

/// A governance active while one function runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundGovernance {
    pub governance: GovernanceIndex,
    /// Required objects offering the governance's extension
    pub enrolled: Vec<ManagedObjectIndex>,
}

/// Bound administration
#[derive(Clone)]
pub struct AdministrationMetaData {
    pub name: String,
    pub extension: String,
    pub duty: Arc<dyn Administration>,
}

impl std::fmt::Debug for AdministrationMetaData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AdministrationMetaData")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .finish()
    }
}

/// Bound governance
#[derive(Clone)]
pub struct GovernanceMetaData {
    pub name: String,
    pub extension: String,
    pub governance: Arc<dyn Governance>,
}

impl std::fmt::Debug for GovernanceMetaData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GovernanceMetaData")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .finish()
    }
}

/// A function's bound view, shared by every invocation.
#[derive(Clone)]
pub struct FunctionMetaData {
    pub name: String,
    pub team: TeamIndex,
    pub parameter_type: Option<String>,
    /// Injected objects, in position order
    pub objects: Vec<ManagedObjectIndex>,
    /// Function-scoped object declarations
    pub function_objects: Vec<ManagedObjectMetaData>,
    /// Every object the function needs, dependencies first
    pub required_objects: Vec<ManagedObjectIndex>,
    /// Process-scoped exclusive objects (ascending index)
    pub exclusive_objects: Vec<usize>,
    pub flows: Vec<FlowMetaData>,
    pub next: Option<FunctionIndex>,
    pub escalations: Vec<EscalationFlow>,
    pub governance: Vec<BoundGovernance>,
    pub pre_administration: Vec<BoundAdministration>,
    pub post_administration: Vec<BoundAdministration>,
    pub body: Arc<dyn FunctionBody>,
}

impl std::fmt::Debug for FunctionMetaData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FunctionMetaData")
            .field("name", &self.name)
            .field("team", &self.team)
            .field("objects", &self.objects)
            .field("required_objects", &self.required_objects)
            .field("flows", &self.flows)
            .field("next", &self.next)
            .field("escalations", &self.escalations)
            .finish()
    }
}

/// The bound, executable graph of one office.
#[derive(Clone)]
pub struct OfficeMetaData {
    pub name: String,
    pub teams: Vec<TeamMetaData>,
    pub functions: Vec<FunctionMetaData>,
    pub function_names: IndexMap<String, FunctionIndex>,
    pub thread_objects: Vec<ManagedObjectMetaData>,
    pub process_objects: Vec<ManagedObjectMetaData>,
    pub administrations: Vec<AdministrationMetaData>,
    pub governances: Vec<GovernanceMetaData>,
    pub escalation_types: EscalationHierarchy,
    pub office_escalations: Vec<EscalationFlow>,
    pub unhandled: Option<Arc<dyn UnhandledEscalationHandler>>,
}

impl std::fmt::Debug for OfficeMetaData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("OfficeMetaData")
            .field("name", &self.name)
            .field("teams", &self.teams)
            .field("functions", &self.functions)
            .field("thread_objects", &self.thread_objects)
            .field("process_objects", &self.process_objects)
            .field("office_escalations", &self.office_escalations)
            .finish()
    }
}

impl OfficeMetaData {
    #[inline]
    pub fn function(
        &self,
        index: FunctionIndex,
    ) -> &FunctionMetaData {
        &self.functions[index.0]
    }

    pub fn function_index(
        &self,
        name: &str,
    ) -> Option<FunctionIndex> {
        self.function_names.get(name).copied()
    }

    /// Metadata of an object as seen from `function`
    pub fn object(
        &self,
        function: FunctionIndex,
        index: ManagedObjectIndex,
    ) -> &ManagedObjectMetaData {
        match index.scope {
            Scope::Function => &self.functions[function.0].function_objects[index.index],
            Scope::Thread => &self.thread_objects[index.index],
            Scope::Process => &self.process_objects[index.index],
        }
    }

    /// Verify every index held by the metadata addresses an existing entry.
    ///
    /// Returns the first out-of-range reference found.
    pub fn check_integrity(&self) -> Result<(), String> {
        let object_in_range = |function: &FunctionMetaData, index: &ManagedObjectIndex| match index
            .scope
        {
            Scope::Function => index.index < function.function_objects.len(),
            Scope::Thread => index.index < self.thread_objects.len(),
            Scope::Process => index.index < self.process_objects.len(),
        };
        let type_in_range = |index: EscalationTypeIndex| index.0 < self.escalation_types.len();
        let function_in_range = |index: FunctionIndex| index.0 < self.functions.len();

        for object in self.thread_objects.iter().chain(&self.process_objects) {
            for dependency in &object.dependencies {
                let in_range = match dependency.scope {
                    Scope::Thread => dependency.index < self.thread_objects.len(),
                    Scope::Process => dependency.index < self.process_objects.len(),
                    Scope::Function => false,
                };
                if !in_range {
                    return Err(format!("object '{}' -> {}", object.name, dependency));
                }
            }
        }

        for function in &self.functions {
            if function.team.0 >= self.teams.len() {
                return Err(format!("function '{}' -> {}", function.name, function.team));
            }
            let objects = function
                .objects
                .iter()
                .chain(&function.required_objects)
                .chain(function.function_objects.iter().flat_map(|o| &o.dependencies))
                .chain(function.governance.iter().flat_map(|g| &g.enrolled))
                .chain(
                    function
                        .pre_administration
                        .iter()
                        .chain(&function.post_administration)
                        .flat_map(|a| &a.objects),
                );
            for index in objects {
                if !object_in_range(function, index) {
                    return Err(format!("function '{}' -> {}", function.name, index));
                }
            }
            for flow in &function.flows {
                if !function_in_range(flow.target) {
                    return Err(format!("function '{}' -> {}", function.name, flow.target));
                }
            }
            if let Some(next) = function.next {
                if !function_in_range(next) {
                    return Err(format!("function '{}' -> {}", function.name, next));
                }
            }
            for escalation in &function.escalations {
                if !function_in_range(escalation.handler) || !type_in_range(escalation.escalation_type) {
                    return Err(format!("function '{}' escalation", function.name));
                }
            }
            for admin in function.pre_administration.iter().chain(&function.post_administration) {
                if admin.administration.0 >= self.administrations.len() {
                    return Err(format!("function '{}' -> {}", function.name, admin.administration));
                }
            }
            for governance in &function.governance {
                if governance.governance.0 >= self.governances.len() {
                    return Err(format!("function '{}' -> {}", function.name, governance.governance));
                }
            }
            for index in &function.exclusive_objects {
                if *index >= self.process_objects.len() {
                    return Err(format!("function '{}' exclusive {}", function.name, index));
                }
            }
        }

        for escalation in &self.office_escalations {
            if !function_in_range(escalation.handler) || !type_in_range(escalation.escalation_type) {
                return Err("office escalation".to_string());
            }
        }

        Ok(())
    }
}
