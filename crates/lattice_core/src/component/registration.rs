//! Registration record kept for every component known to the runtime.
//!
//! # Invariants
//! - The descriptor and the declared extensions never change after creation.
//! - State writes go through `set_state`, called by the manager under its lock.
//! - The instance exists between instantiation and deactivation only.

use crate::component::instance::ComponentInstance;
use crate::extension::Extension;
use crate::model::descriptor::ComponentDescriptor;
use crate::model::name::ComponentName;
use crate::model::state::{AtomicComponentState, ComponentState};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub struct RegistrationInfo {
    descriptor: Arc<ComponentDescriptor>,
    state: AtomicComponentState,
    extensions: Vec<Arc<Extension>>,
    instance: RwLock<Option<Arc<ComponentInstance>>>,
}

impl RegistrationInfo {
    pub fn new(descriptor: Arc<ComponentDescriptor>) -> Self {
        let extensions = descriptor
            .extensions
            .iter()
            .enumerate()
            .map(|(index, decl)| Arc::new(Extension::declared(&descriptor.name, index, decl)))
            .collect();
        Self {
            descriptor,
            state: AtomicComponentState::new(ComponentState::Unregistered),
            extensions,
            instance: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &ComponentName {
        &self.descriptor.name
    }

    pub fn aliases(&self) -> &BTreeSet<ComponentName> {
        &self.descriptor.aliases
    }

    pub fn descriptor(&self) -> &Arc<ComponentDescriptor> {
        &self.descriptor
    }

    pub fn state(&self) -> ComponentState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, next: ComponentState) -> bool {
        self.state.transition(self.descriptor.name.as_str(), next)
    }

    /// Extensions this component contributes to others.
    pub fn extensions(&self) -> &[Arc<Extension>] {
        &self.extensions
    }

    pub fn start_order(&self) -> i32 {
        self.descriptor.start_order
    }

    pub fn provided_services(&self) -> &[String] {
        &self.descriptor.provided_services
    }

    pub fn instance(&self) -> Option<Arc<ComponentInstance>> {
        self.instance.read().clone()
    }

    pub(crate) fn set_instance(&self, instance: ComponentInstance) -> Arc<ComponentInstance> {
        let instance = Arc::new(instance);
        *self.instance.write() = Some(Arc::clone(&instance));
        instance
    }

    pub(crate) fn take_instance(&self) -> Option<Arc<ComponentInstance>> {
        self.instance.write().take()
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    pub fn is_resolved(&self) -> bool {
        self.state().is_resolved()
    }

    pub fn is_started(&self) -> bool {
        self.state() == ComponentState::Started
    }

    /// Whether `name` is the primary name or one of the aliases.
    pub fn answers_to(&self, name: &ComponentName) -> bool {
        self.descriptor.name == *name || self.descriptor.aliases.contains(name)
    }
}

impl Debug for RegistrationInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationInfo")
            .field("name", &self.descriptor.name)
            .field("state", &self.state())
            .field("extensions", &self.extensions.len())
            .finish()
    }
}
