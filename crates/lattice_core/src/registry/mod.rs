//! Dependency registry contracts.
//!
//! # Responsibility
//! - Hold every registered component record and decide which ones have all
//!   their dependencies resolved.
//! - Yield a dependency-safe iteration order (leaves first).
//!
//! # Invariants
//! - Primary names and aliases are unique across the registry.
//! - Lookups by alias return the same record as lookups by primary name.
//! - Registries never touch component state; they report which records
//!   changed resolution and the manager applies the transitions.
//!
//! # See also
//! - `component_registry` for the default in-memory implementation.

pub mod component_registry;

pub use component_registry::ComponentRegistry;

use crate::component::registration::RegistrationInfo;
use crate::model::name::ComponentName;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Registry mutation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName(ComponentName),
    DuplicateAlias {
        alias: ComponentName,
        component: ComponentName,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "duplicate component name: {name}"),
            Self::DuplicateAlias { alias, component } => {
                write!(f, "duplicate component name: {alias} (alias for {component})")
            }
        }
    }
}

impl Error for RegistryError {}

/// Result of removing one component.
#[derive(Debug)]
pub struct Removal {
    pub removed: Arc<RegistrationInfo>,
    /// Formerly resolved dependents that lost resolution, in resolution order.
    pub unresolved: Vec<Arc<RegistrationInfo>>,
}

/// Store of registered components with dependency resolution.
pub trait DependencyRegistry: Send {
    /// Adds one record and returns every record that became resolved because
    /// of it, in resolution order. Empty when the new record stays pending.
    fn add_component(
        &mut self,
        info: Arc<RegistrationInfo>,
    ) -> Result<Vec<Arc<RegistrationInfo>>, RegistryError>;

    /// Removes the record known as `name` (primary or alias).
    fn remove_component(&mut self, name: &ComponentName) -> Option<Removal>;

    /// Dependencies still missing for a pending component.
    fn missing_dependencies(&self, name: &ComponentName) -> BTreeSet<ComponentName>;

    /// Resolved records, leaves first.
    fn resolved_registration_info(&self) -> Vec<Arc<RegistrationInfo>>;

    fn get_component(&self, name: &ComponentName) -> Option<Arc<RegistrationInfo>>;

    fn contains(&self, name: &ComponentName) -> bool;

    /// Every record, in registration order.
    fn components(&self) -> Vec<Arc<RegistrationInfo>>;

    /// Pending component name to missing dependency names.
    fn pending_components(&self) -> BTreeMap<ComponentName, BTreeSet<ComponentName>>;

    /// Resolved components depending on `name`, directly or transitively,
    /// in resolution order.
    fn dependents(&self, name: &ComponentName) -> Vec<Arc<RegistrationInfo>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deep copy holding fresh records rebuilt from the same descriptors.
    fn snapshot(&self) -> Box<dyn DependencyRegistry>;
}
