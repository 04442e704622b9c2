//! Default in-memory dependency registry.
//!
//! Dependencies are the explicit `requires` names plus the super components
//! targeted by delegating extension points. A dependency is satisfied once a
//! component answering to that name (primary or alias) is resolved. Cycles
//! and missing names keep their members pending.

use crate::component::registration::RegistrationInfo;
use crate::model::name::ComponentName;
use crate::model::state::ComponentState;
use crate::registry::{DependencyRegistry, RegistryError, Removal};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: IndexMap<ComponentName, Arc<RegistrationInfo>>,
    aliases: HashMap<ComponentName, ComponentName>,
    resolved: IndexSet<ComponentName>,
    pending: BTreeMap<ComponentName, BTreeSet<ComponentName>>,
    /// Declared dependency name to the pending components waiting on it.
    waiting: HashMap<ComponentName, BTreeSet<ComponentName>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn canonical(&self, name: &ComponentName) -> Option<&ComponentName> {
        if let Some((primary, _)) = self.components.get_key_value(name) {
            return Some(primary);
        }
        self.aliases.get(name)
    }

    fn is_satisfied(&self, dependency: &ComponentName) -> bool {
        self.canonical(dependency)
            .is_some_and(|primary| self.resolved.contains(primary))
    }

    fn missing_for(&self, info: &RegistrationInfo) -> BTreeSet<ComponentName> {
        info.descriptor()
            .dependencies()
            .into_iter()
            .filter(|dependency| !self.is_satisfied(dependency))
            .collect()
    }

    fn park(&mut self, name: &ComponentName, missing: BTreeSet<ComponentName>) {
        for dependency in &missing {
            self.waiting
                .entry(dependency.clone())
                .or_default()
                .insert(name.clone());
        }
        self.pending.insert(name.clone(), missing);
    }

    fn unpark(&mut self, name: &ComponentName) {
        if let Some(missing) = self.pending.remove(name) {
            for dependency in missing {
                if let Some(waiters) = self.waiting.get_mut(&dependency) {
                    waiters.remove(name);
                    if waiters.is_empty() {
                        self.waiting.remove(&dependency);
                    }
                }
            }
        }
    }

    /// Resolves `name` and every pending component it unblocks.
    fn resolve_from(&mut self, name: ComponentName) -> Vec<Arc<RegistrationInfo>> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            let Some(info) = self.components.get(&current).cloned() else {
                continue;
            };
            if !self.resolved.insert(current.clone()) {
                continue;
            }
            for answered in info.descriptor().all_names() {
                let Some(waiters) = self.waiting.remove(answered) else {
                    continue;
                };
                for waiter in waiters {
                    let now_ready = match self.pending.get_mut(&waiter) {
                        Some(missing) => {
                            missing.remove(answered);
                            missing.is_empty()
                        }
                        None => false,
                    };
                    if now_ready {
                        self.pending.remove(&waiter);
                        queue.push_back(waiter);
                    }
                }
            }
            out.push(info);
        }
        out
    }

    /// Resolved components whose dependencies name one of `names`.
    fn direct_dependents(&self, names: &BTreeSet<ComponentName>) -> Vec<ComponentName> {
        self.resolved
            .iter()
            .filter(|candidate| {
                self.components.get(*candidate).is_some_and(|info| {
                    info.descriptor()
                        .dependencies()
                        .iter()
                        .any(|dependency| names.contains(dependency))
                })
            })
            .cloned()
            .collect()
    }

    fn names_of(&self, primary: &ComponentName) -> BTreeSet<ComponentName> {
        self.components
            .get(primary)
            .map(|info| info.descriptor().all_names().cloned().collect())
            .unwrap_or_default()
    }

    fn transitive_dependents(&self, primary: &ComponentName) -> Vec<ComponentName> {
        let mut found: IndexSet<ComponentName> = IndexSet::new();
        let mut queue = VecDeque::from([primary.clone()]);
        while let Some(current) = queue.pop_front() {
            let names = self.names_of(&current);
            for dependent in self.direct_dependents(&names) {
                if dependent != *primary && found.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        let mut ordered: Vec<ComponentName> = found.into_iter().collect();
        ordered.sort_by_key(|name| self.resolved.get_index_of(name));
        ordered
    }
}

impl DependencyRegistry for ComponentRegistry {
    fn add_component(
        &mut self,
        info: Arc<RegistrationInfo>,
    ) -> Result<Vec<Arc<RegistrationInfo>>, RegistryError> {
        let name = info.name().clone();
        if self.canonical(&name).is_some() {
            return Err(RegistryError::DuplicateName(name));
        }
        for alias in info.aliases() {
            if self.canonical(alias).is_some() {
                return Err(RegistryError::DuplicateAlias {
                    alias: alias.clone(),
                    component: name,
                });
            }
        }

        for alias in info.aliases() {
            self.aliases.insert(alias.clone(), name.clone());
        }
        self.components.insert(name.clone(), Arc::clone(&info));

        let missing = self.missing_for(&info);
        if missing.is_empty() {
            return Ok(self.resolve_from(name));
        }
        debug!(
            "event=registry_add module=registry status=pending component={} missing={}",
            name,
            missing.len()
        );
        self.park(&name, missing);
        Ok(Vec::new())
    }

    fn remove_component(&mut self, name: &ComponentName) -> Option<Removal> {
        let primary = self.canonical(name)?.clone();
        let cascade = if self.resolved.contains(&primary) {
            self.transitive_dependents(&primary)
        } else {
            Vec::new()
        };

        self.unpark(&primary);
        self.resolved.shift_remove(&primary);
        let removed = self.components.shift_remove(&primary)?;
        for alias in removed.aliases() {
            self.aliases.remove(alias);
        }

        // Pending components counted the removed one as satisfied.
        let removed_names: BTreeSet<ComponentName> =
            removed.descriptor().all_names().cloned().collect();
        let stale: Vec<Arc<RegistrationInfo>> = self
            .pending
            .keys()
            .filter_map(|pending| self.components.get(pending))
            .filter(|info| {
                info.descriptor()
                    .dependencies()
                    .iter()
                    .any(|dependency| removed_names.contains(dependency))
            })
            .cloned()
            .collect();
        for info in stale {
            self.unpark(info.name());
            let missing = self.missing_for(&info);
            self.park(info.name(), missing);
        }

        let mut unresolved = Vec::with_capacity(cascade.len());
        for dependent in &cascade {
            self.resolved.shift_remove(dependent);
        }
        for dependent in cascade {
            let Some(info) = self.components.get(&dependent).cloned() else {
                continue;
            };
            let missing = self.missing_for(&info);
            self.park(&dependent, missing);
            unresolved.push(info);
        }
        Some(Removal {
            removed,
            unresolved,
        })
    }

    fn missing_dependencies(&self, name: &ComponentName) -> BTreeSet<ComponentName> {
        self.canonical(name)
            .and_then(|primary| self.pending.get(primary))
            .cloned()
            .unwrap_or_default()
    }

    fn resolved_registration_info(&self) -> Vec<Arc<RegistrationInfo>> {
        self.resolved
            .iter()
            .filter_map(|name| self.components.get(name).cloned())
            .collect()
    }

    fn get_component(&self, name: &ComponentName) -> Option<Arc<RegistrationInfo>> {
        self.canonical(name)
            .and_then(|primary| self.components.get(primary))
            .cloned()
    }

    fn contains(&self, name: &ComponentName) -> bool {
        self.canonical(name).is_some()
    }

    fn components(&self) -> Vec<Arc<RegistrationInfo>> {
        self.components.values().cloned().collect()
    }

    fn pending_components(&self) -> BTreeMap<ComponentName, BTreeSet<ComponentName>> {
        self.pending.clone()
    }

    fn dependents(&self, name: &ComponentName) -> Vec<Arc<RegistrationInfo>> {
        let Some(primary) = self.canonical(name) else {
            return Vec::new();
        };
        self.transitive_dependents(primary)
            .iter()
            .filter_map(|dependent| self.components.get(dependent).cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.components.len()
    }

    fn snapshot(&self) -> Box<dyn DependencyRegistry> {
        let mut copy = ComponentRegistry::new();
        for info in self.components.values() {
            let fresh = Arc::new(RegistrationInfo::new(Arc::clone(info.descriptor())));
            fresh.set_state(ComponentState::Pending);
            // Names were unique in the source registry.
            if let Ok(resolved) = copy.add_component(fresh) {
                for record in resolved {
                    record.set_state(ComponentState::Resolved);
                }
            }
        }
        Box::new(copy)
    }
}
