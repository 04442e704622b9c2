//! Per-extension-point contribution registries.
//!
//! # Responsibility
//! - Define the contract the manager drives for one (component, point) pair.
//! - Provide `MapRegistry`, a keyed registry used for the built-in `map`
//!   contribution kind.
//!
//! # Invariants
//! - Contributions registered before `initialize` are buffered and applied in
//!   arrival order once the owning component starts.
//! - A tag registers at most once; redeploying a tagged extension is a no-op.

use indexmap::IndexMap;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Built-in contribution kind backed by `MapRegistry`.
pub const MAP_CONTRIBUTION_KIND: &str = "map";
/// Field identifying one contribution inside a `MapRegistry`.
pub const DEFAULT_ID_FIELD: &str = "id";
/// Optional boolean field toggling a contribution on registration.
pub const ENABLED_FIELD: &str = "enabled";

/// Factory creating a fresh registry for one extension point.
pub type RegistryFactory = Arc<dyn Fn() -> Box<dyn ContributionRegistry> + Send + Sync>;

/// Registry accumulating contributions to one extension point.
pub trait ContributionRegistry: Send + 'static {
    /// Called when the owning component starts.
    fn initialize(&mut self);
    fn is_initialized(&self) -> bool;
    fn tag(&mut self, tag: &str);
    fn is_tagged(&self, tag: &str) -> bool;
    fn register(&mut self, tag: &str, contributions: &[Value]) -> Result<(), ContributionError>;
    /// Removes everything registered under `tag` and forgets the tag.
    fn unregister(&mut self, tag: &str) -> Result<(), ContributionError>;
    fn enable(&mut self, id: &str);
    fn disable(&mut self, id: &str);
    fn as_any(&self) -> &dyn Any;
}

/// Contribution registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContributionError {
    MissingId { tag: String, field: String },
    NotAnObject { tag: String },
}

impl Display for ContributionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId { tag, field } => {
                write!(f, "contribution from {tag} has no string `{field}` field")
            }
            Self::NotAnObject { tag } => write!(f, "contribution from {tag} is not an object"),
        }
    }
}

impl Error for ContributionError {}

#[derive(Debug, Clone)]
struct Entry {
    tag: String,
    value: Value,
}

/// Keyed registry: contributions sharing an id stack, the latest wins.
#[derive(Debug)]
pub struct MapRegistry {
    id_field: String,
    initialized: bool,
    tags: BTreeSet<String>,
    buffered: Vec<(String, Vec<Value>)>,
    entries: IndexMap<String, Vec<Entry>>,
    disabled: BTreeSet<String>,
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self::with_id_field(DEFAULT_ID_FIELD)
    }
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_field(field: impl Into<String>) -> Self {
        Self {
            id_field: field.into(),
            initialized: false,
            tags: BTreeSet::new(),
            buffered: Vec::new(),
            entries: IndexMap::new(),
            disabled: BTreeSet::new(),
        }
    }

    /// Effective contribution for `id`, if registered and enabled.
    pub fn get(&self, id: &str) -> Option<&Value> {
        if self.disabled.contains(id) {
            return None;
        }
        self.entries
            .get(id)
            .and_then(|stack| stack.last())
            .map(|entry| &entry.value)
    }

    /// Enabled contributions in first-registration order.
    pub fn contributions(&self) -> Vec<(&str, &Value)> {
        self.entries
            .iter()
            .filter(|(id, _)| !self.disabled.contains(id.as_str()))
            .filter_map(|(id, stack)| stack.last().map(|entry| (id.as_str(), &entry.value)))
            .collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.entries.contains_key(id) && !self.disabled.contains(id)
    }

    pub fn len(&self) -> usize {
        self.contributions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registrations buffered until `initialize`.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    fn ids_of(&self, tag: &str, contributions: &[Value]) -> Result<Vec<String>, ContributionError> {
        contributions
            .iter()
            .map(|value| {
                let object = value.as_object().ok_or_else(|| ContributionError::NotAnObject {
                    tag: tag.to_string(),
                })?;
                object
                    .get(&self.id_field)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ContributionError::MissingId {
                        tag: tag.to_string(),
                        field: self.id_field.clone(),
                    })
            })
            .collect()
    }

    fn apply(&mut self, tag: &str, ids: Vec<String>, contributions: &[Value]) {
        for (id, value) in ids.into_iter().zip(contributions) {
            match value.get(ENABLED_FIELD).and_then(Value::as_bool) {
                Some(false) => {
                    self.disabled.insert(id.clone());
                }
                Some(true) => {
                    self.disabled.remove(&id);
                }
                None => {}
            }
            self.entries.entry(id).or_default().push(Entry {
                tag: tag.to_string(),
                value: value.clone(),
            });
        }
    }
}

impl ContributionRegistry for MapRegistry {
    fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        for (tag, contributions) in std::mem::take(&mut self.buffered) {
            // Validated on the way in.
            if let Ok(ids) = self.ids_of(&tag, &contributions) {
                self.apply(&tag, ids, &contributions);
            }
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn tag(&mut self, tag: &str) {
        self.tags.insert(tag.to_string());
    }

    fn is_tagged(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    fn register(&mut self, tag: &str, contributions: &[Value]) -> Result<(), ContributionError> {
        let ids = self.ids_of(tag, contributions)?;
        if self.initialized {
            self.apply(tag, ids, contributions);
        } else {
            self.buffered.push((tag.to_string(), contributions.to_vec()));
        }
        Ok(())
    }

    fn unregister(&mut self, tag: &str) -> Result<(), ContributionError> {
        self.tags.remove(tag);
        self.buffered.retain(|(buffered_tag, _)| buffered_tag != tag);
        for stack in self.entries.values_mut() {
            stack.retain(|entry| entry.tag != tag);
        }
        self.entries.retain(|_, stack| !stack.is_empty());
        Ok(())
    }

    fn enable(&mut self, id: &str) {
        self.disabled.remove(id);
    }

    fn disable(&mut self, id: &str) {
        self.disabled.insert(id.to_string());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Contribution kind to registry factory mapping.
#[derive(Clone)]
pub struct RegistryCatalog {
    factories: HashMap<String, RegistryFactory>,
}

impl Default for RegistryCatalog {
    fn default() -> Self {
        let mut catalog = Self {
            factories: HashMap::new(),
        };
        catalog.insert(MAP_CONTRIBUTION_KIND, || {
            Box::new(MapRegistry::new()) as Box<dyn ContributionRegistry>
        });
        catalog
    }
}

impl RegistryCatalog {
    pub fn insert<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ContributionRegistry> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn get(&self, kind: &str) -> Option<RegistryFactory> {
        self.factories.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
