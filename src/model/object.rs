//! Managed object declarations and the source collaborator contract

use std::sync::Arc;
use std::time::Duration;

use super::{DependencyRef, Escalation, Object, Scope};
use crate::runtime::engine::ObjectUser;

/// Supplies managed object instances.
///
/// Sourcing is synchronous when [`ObjectUser::provide`] (or
/// [`ObjectUser::fail`]) is called before `source` returns, and
/// asynchronous otherwise: the requesting function suspends until the user is
/// completed from any thread, or until the object's timeout elapses.
pub trait ManagedObjectSource: Send + Sync + 'static {
    /// Source an instance. `dependencies` follow the declared dependency order.
    fn source(
        &self,
        dependencies: &[Object],
        user: ObjectUser,
    );

    /// Release an instance when its scope is torn down
    fn release(
        &self,
        _object: &Object,
    ) {
    }
}

/// Synchronous source built from a closure.
pub struct FnSource<F> {
    factory: F,
}

impl<F> FnSource<F>
where
    F: Fn(&[Object]) -> Result<Object, Escalation> + Send + Sync + 'static,
{
    /// Wrap a factory closure
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F> ManagedObjectSource for FnSource<F>
where
    F: Fn(&[Object]) -> Result<Object, Escalation> + Send + Sync + 'static,
{
    fn source(
        &self,
        dependencies: &[Object],
        user: ObjectUser,
    ) {
        match (self.factory)(dependencies) {
            Ok(object) => user.provide(object),
            Err(escalation) => user.fail(escalation),
        }
    }
}

/// Declaration of one managed object
#[derive(Clone)]
pub struct ManagedObjectConfig {
    /// Name, unique among the office's (or function's) objects
    pub name: String,
    /// Lifetime scope
    pub scope: Scope,
    /// Type name used to resolve typed dependencies
    pub object_type: Option<String>,
    /// Qualifier distinguishing objects of the same type
    pub qualifier: Option<String>,
    /// Dependencies in injection order
    pub dependencies: Vec<DependencyRef>,
    /// Extension interfaces offered to administration and governance
    pub extensions: Vec<String>,
    /// Process-scoped objects that one thread at a time may use
    pub exclusive: bool,
    /// Asynchronous sourcing timeout (`None` uses the runtime default)
    pub timeout: Option<Duration>,
    /// Instance supplier
    pub source: Arc<dyn ManagedObjectSource>,
}

impl std::fmt::Debug for ManagedObjectConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ManagedObjectConfig")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("object_type", &self.object_type)
            .field("qualifier", &self.qualifier)
            .field("dependencies", &self.dependencies)
            .field("extensions", &self.extensions)
            .field("exclusive", &self.exclusive)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ManagedObjectConfig {
    /// Declare an object supplied by `source`
    pub fn new(
        name: impl Into<String>,
        scope: Scope,
        source: impl ManagedObjectSource,
    ) -> Self {
        Self::with_source(name, scope, Arc::new(source))
    }

    /// Declare an object supplied by a shared source
    pub fn with_source(
        name: impl Into<String>,
        scope: Scope,
        source: Arc<dyn ManagedObjectSource>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            object_type: None,
            qualifier: None,
            dependencies: Vec::new(),
            extensions: Vec::new(),
            exclusive: false,
            timeout: None,
            source,
        }
    }

    /// Declare an object produced synchronously by a closure
    pub fn from_fn<F>(
        name: impl Into<String>,
        scope: Scope,
        factory: F,
    ) -> Self
    where
        F: Fn(&[Object]) -> Result<Object, Escalation> + Send + Sync + 'static,
    {
        Self::new(name, scope, FnSource::new(factory))
    }

    /// Set the object type
    pub fn object_type(
        mut self,
        type_name: impl Into<String>,
    ) -> Self {
        self.object_type = Some(type_name.into());
        self
    }

    /// Set the qualifier
    pub fn qualifier(
        mut self,
        qualifier: impl Into<String>,
    ) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Add a dependency
    pub fn depends_on(
        mut self,
        dependency: DependencyRef,
    ) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add an extension interface
    pub fn extension(
        mut self,
        extension: impl Into<String>,
    ) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Require exclusive access per thread
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Set the asynchronous sourcing timeout
    pub fn timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check whether the declared type (and qualifier, when asked for) match
    pub fn satisfies(
        &self,
        type_name: &str,
        qualifier: Option<&str>,
    ) -> bool {
        if self.object_type.as_deref() != Some(type_name) {
            return false;
        }
        match qualifier {
            Some(qualifier) => self.qualifier.as_deref() == Some(qualifier),
            None => true,
        }
    }
}
