//! Component descriptors produced by descriptor loading.
//!
//! # Responsibility
//! - Carry everything the runtime needs to register one component: identity,
//!   declared extension points, declared extensions and implementation.
//! - Validate declaration-level invariants before registration.
//!
//! # Invariants
//! - Descriptors are immutable once built and shared behind `Arc`.
//! - The primary name never appears in its own alias set.
//! - Extension point names are unique within one descriptor.

use crate::component::{Component, ComponentContext, ComponentError, ComponentFactory};
use crate::extension::registry::{ContributionRegistry, RegistryFactory};
use crate::model::name::{ComponentName, NameError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// How a component obtains its executable implementation.
#[derive(Clone)]
pub enum Implementation {
    /// Factory closure invoked at instantiation time.
    Factory(ComponentFactory),
    /// Name of a factory registered in the manager's implementation catalog.
    Named(String),
}

impl Debug for Implementation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("Implementation::Factory(..)"),
            Self::Named(name) => write!(f, "Implementation::Named({name:?})"),
        }
    }
}

/// Re-targeting declaration: contributions to this point are forwarded to
/// another component's point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointDelegate {
    pub component: ComponentName,
    /// Defaults to the delegating point's own name when `None`.
    pub point: Option<String>,
}

/// Extension point declared by a component.
#[derive(Clone)]
pub struct ExtensionPointDecl {
    pub name: String,
    pub delegate: Option<PointDelegate>,
    /// Explicit registry factory; wins over `contribution_kind`.
    pub registry: Option<RegistryFactory>,
    /// Contribution kind used to infer a registry factory from the catalog.
    pub contribution_kind: Option<String>,
}

impl ExtensionPointDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delegate: None,
            registry: None,
            contribution_kind: None,
        }
    }

    /// Forwards contributions to `component`'s point of the same name.
    pub fn delegate_to(mut self, component: ComponentName, point: Option<String>) -> Self {
        self.delegate = Some(PointDelegate { component, point });
        self
    }

    pub fn with_registry<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ContributionRegistry> + Send + Sync + 'static,
    {
        self.registry = Some(Arc::new(factory));
        self
    }

    pub fn with_contribution_kind(mut self, kind: impl Into<String>) -> Self {
        self.contribution_kind = Some(kind.into());
        self
    }
}

impl Debug for ExtensionPointDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPointDecl")
            .field("name", &self.name)
            .field("delegate", &self.delegate)
            .field("registry", &self.registry.as_ref().map(|_| ".."))
            .field("contribution_kind", &self.contribution_kind)
            .finish()
    }
}

/// Extension declared by a component, contributed to another component.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDecl {
    pub target: ComponentName,
    pub point: String,
    pub contributions: Vec<Value>,
}

/// Fully-populated component descriptor.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub name: ComponentName,
    pub aliases: BTreeSet<ComponentName>,
    pub requires: BTreeSet<ComponentName>,
    pub extension_points: Vec<ExtensionPointDecl>,
    pub extensions: Vec<ExtensionDecl>,
    pub provided_services: Vec<String>,
    /// Start-order hint; lower values start first, ties broken by bare name.
    pub start_order: i32,
    pub implementation: Option<Implementation>,
    pub properties: BTreeMap<String, String>,
    /// Deployment location (file, bundle entry) the descriptor came from.
    pub source_location: Option<String>,
}

impl ComponentDescriptor {
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    pub fn extension_point(&self, name: &str) -> Option<&ExtensionPointDecl> {
        self.extension_points.iter().find(|xp| xp.name == name)
    }

    /// Names this component must see resolved before it can resolve itself.
    pub fn dependencies(&self) -> BTreeSet<ComponentName> {
        let mut deps = self.requires.clone();
        for xp in &self.extension_points {
            if let Some(delegate) = &xp.delegate {
                if delegate.component != self.name {
                    deps.insert(delegate.component.clone());
                }
            }
        }
        deps
    }

    /// Primary name followed by every alias.
    pub fn all_names(&self) -> impl Iterator<Item = &ComponentName> {
        std::iter::once(&self.name).chain(self.aliases.iter())
    }
}

/// Builder collecting raw declarations; names are parsed in `build`.
pub struct DescriptorBuilder {
    name: String,
    aliases: Vec<String>,
    requires: Vec<String>,
    extension_points: Vec<ExtensionPointDecl>,
    extensions: Vec<(String, String, Vec<Value>)>,
    provided_services: Vec<String>,
    start_order: i32,
    implementation: Option<Implementation>,
    properties: BTreeMap<String, String>,
    source_location: Option<String>,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            requires: Vec::new(),
            extension_points: Vec::new(),
            extensions: Vec::new(),
            provided_services: Vec::new(),
            start_order: 0,
            implementation: None,
            properties: BTreeMap::new(),
            source_location: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }

    pub fn extension_point(mut self, point: ExtensionPointDecl) -> Self {
        self.extension_points.push(point);
        self
    }

    pub fn extension(
        mut self,
        target: impl Into<String>,
        point: impl Into<String>,
        contributions: Vec<Value>,
    ) -> Self {
        self.extensions
            .push((target.into(), point.into(), contributions));
        self
    }

    pub fn provides(mut self, service: impl Into<String>) -> Self {
        self.provided_services.push(service.into());
        self
    }

    pub fn start_order(mut self, order: i32) -> Self {
        self.start_order = order;
        self
    }

    pub fn implementation<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ComponentContext) -> Result<Arc<dyn Component>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        self.implementation = Some(Implementation::Factory(Arc::new(factory)));
        self
    }

    /// Uses one shared implementation for every instantiation.
    pub fn instance(self, component: Arc<dyn Component>) -> Self {
        self.implementation(move |_| Ok(Arc::clone(&component)))
    }

    pub fn implementation_ref(mut self, name: impl Into<String>) -> Self {
        self.implementation = Some(Implementation::Named(name.into()));
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn source_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = Some(location.into());
        self
    }

    pub fn build(self) -> Result<ComponentDescriptor, DescriptorError> {
        let name = ComponentName::parse(&self.name)?;

        let mut aliases = BTreeSet::new();
        for raw in &self.aliases {
            let alias = ComponentName::parse(raw)?;
            if alias == name {
                return Err(DescriptorError::AliasIsPrimaryName(alias));
            }
            aliases.insert(alias);
        }

        let requires = self
            .requires
            .iter()
            .map(|raw| ComponentName::parse(raw))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut seen = BTreeSet::new();
        for xp in &self.extension_points {
            let point = xp.name.trim();
            if point.is_empty() {
                return Err(DescriptorError::EmptyPointName);
            }
            if !seen.insert(point.to_string()) {
                return Err(DescriptorError::DuplicatePoint(point.to_string()));
            }
        }

        let mut extensions = Vec::with_capacity(self.extensions.len());
        for (target, point, contributions) in self.extensions {
            let point = point.trim().to_string();
            if point.is_empty() {
                return Err(DescriptorError::EmptyPointName);
            }
            extensions.push(ExtensionDecl {
                target: ComponentName::parse(&target)?,
                point,
                contributions,
            });
        }

        Ok(ComponentDescriptor {
            name,
            aliases,
            requires,
            extension_points: self.extension_points,
            extensions,
            provided_services: self.provided_services,
            start_order: self.start_order,
            implementation: self.implementation,
            properties: self.properties,
            source_location: self.source_location,
        })
    }
}

/// Descriptor validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    Name(NameError),
    AliasIsPrimaryName(ComponentName),
    EmptyPointName,
    DuplicatePoint(String),
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(err) => write!(f, "{err}"),
            Self::AliasIsPrimaryName(name) => {
                write!(f, "alias repeats the primary component name: {name}")
            }
            Self::EmptyPointName => write!(f, "extension point name must not be empty"),
            Self::DuplicatePoint(point) => {
                write!(f, "extension point declared twice: {point}")
            }
        }
    }
}

impl Error for DescriptorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NameError> for DescriptorError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}
