//! Ownership of per-(component, point) contribution registries.
//!
//! # Invariants
//! - At most one registry exists per (component, point) pair.
//! - Registries are dropped when their component deactivates; contributions
//!   do not survive an activate/deactivate cycle.

use crate::extension::registry::{ContributionRegistry, RegistryCatalog, RegistryFactory};
use crate::model::descriptor::ExtensionPointDecl;
use crate::model::name::ComponentName;
use log::warn;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
pub struct PointRegistries {
    by_component: HashMap<ComponentName, BTreeMap<String, Box<dyn ContributionRegistry>>>,
}

impl PointRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, component: &ComponentName, point: &str) -> Option<&dyn ContributionRegistry> {
        self.by_component
            .get(component)
            .and_then(|points| points.get(point))
            .map(|registry| &**registry)
    }

    pub fn get_mut(
        &mut self,
        component: &ComponentName,
        point: &str,
    ) -> Option<&mut dyn ContributionRegistry> {
        self.by_component
            .get_mut(component)
            .and_then(|points| points.get_mut(point))
            .map(|registry| &mut **registry)
    }

    /// Factory for `point` when `component` has no registry for it yet.
    ///
    /// Points with neither an explicit factory nor a known contribution kind
    /// have no registry. The caller builds the registry and hands it to
    /// `insert`, so client factories never run under a borrow of this map.
    pub fn missing_factory(
        &self,
        component: &ComponentName,
        point: &ExtensionPointDecl,
        catalog: &RegistryCatalog,
    ) -> Option<RegistryFactory> {
        if self.get(component, &point.name).is_some() {
            return None;
        }
        factory_for(component, point, catalog)
    }

    /// Stores `registry` for `point` unless one already exists.
    pub fn insert(
        &mut self,
        component: &ComponentName,
        point: &str,
        registry: Box<dyn ContributionRegistry>,
    ) {
        self.by_component
            .entry(component.clone())
            .or_default()
            .entry(point.to_string())
            .or_insert(registry);
    }

    /// Initializes every registry owned by `component`.
    pub fn initialize(&mut self, component: &ComponentName) {
        if let Some(points) = self.by_component.get_mut(component) {
            for registry in points.values_mut() {
                registry.initialize();
            }
        }
    }

    pub fn reset(&mut self, component: &ComponentName) {
        self.by_component.remove(component);
    }

    pub fn clear(&mut self) {
        self.by_component.clear();
    }

    pub fn points_of(&self, component: &ComponentName) -> Vec<String> {
        self.by_component
            .get(component)
            .map(|points| points.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn factory_for(
    component: &ComponentName,
    point: &ExtensionPointDecl,
    catalog: &RegistryCatalog,
) -> Option<RegistryFactory> {
    if let Some(factory) = &point.registry {
        return Some(factory.clone());
    }
    let kind = point.contribution_kind.as_deref()?;
    let factory = catalog.get(kind);
    if factory.is_none() {
        warn!(
            "event=registry_create module=extension status=skipped component={} point={} kind={}",
            component, point.name, kind
        );
    }
    factory
}
