//! Administration and governance declarations

use std::sync::Arc;

use super::{DependencyRef, Escalation, Object};

/// Pre/post interception of a function's managed objects.
pub trait Administration: Send + Sync + 'static {
    /// Administer the extension interfaces of the administered objects
    fn administer(
        &self,
        extensions: &[Object],
    ) -> Result<(), Escalation>;
}

impl<F> Administration for F
where
    F: Fn(&[Object]) -> Result<(), Escalation> + Send + Sync + 'static,
{
    fn administer(
        &self,
        extensions: &[Object],
    ) -> Result<(), Escalation> {
        self(extensions)
    }
}

/// Cross-cutting interception of every object carrying an extension interface.
///
/// Objects used by a governed function are enrolled before its body runs.
/// The enrolled set is enforced when the function completes, or disregarded
/// when it escalates.
pub trait Governance: Send + Sync + 'static {
    fn enrol(
        &self,
        _extension: &Object,
    ) -> Result<(), Escalation> {
        Ok(())
    }

    fn enforce(
        &self,
        extensions: &[Object],
    ) -> Result<(), Escalation>;

    fn disregard(
        &self,
        _extensions: &[Object],
    ) -> Result<(), Escalation> {
        Ok(())
    }
}

/// Declaration of an administration
#[derive(Clone)]
pub struct AdministrationConfig {
    pub name: String,
    /// Extension interface every administered object must offer
    pub extension: String,
    /// Administered objects
    pub administer: Vec<DependencyRef>,
    pub duty: Arc<dyn Administration>,
}

impl std::fmt::Debug for AdministrationConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AdministrationConfig")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field("administer", &self.administer)
            .finish()
    }
}

impl AdministrationConfig {
    /// Declare an administration from a closure
    pub fn new<F>(
        name: impl Into<String>,
        extension: impl Into<String>,
        duty: F,
    ) -> Self
    where
        F: Fn(&[Object]) -> Result<(), Escalation> + Send + Sync + 'static,
    {
        Self::with_duty(name, extension, Arc::new(duty))
    }

    /// Declare an administration from a shared implementation
    pub fn with_duty(
        name: impl Into<String>,
        extension: impl Into<String>,
        duty: Arc<dyn Administration>,
    ) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            administer: Vec::new(),
            duty,
        }
    }

    /// Administer another object
    pub fn administer(
        mut self,
        object: DependencyRef,
    ) -> Self {
        self.administer.push(object);
        self
    }
}

/// Declaration of a governance
#[derive(Clone)]
pub struct GovernanceConfig {
    pub name: String,
    /// Extension interface of the governed objects
    pub extension: String,
    pub governance: Arc<dyn Governance>,
}

impl std::fmt::Debug for GovernanceConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GovernanceConfig")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .finish()
    }
}

impl GovernanceConfig {
    pub fn new(
        name: impl Into<String>,
        extension: impl Into<String>,
        governance: impl Governance,
    ) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            governance: Arc::new(governance),
        }
    }
}
