//! Component implementation contracts.
//!
//! # Responsibility
//! - Define the optional-hook `Component` trait implemented by clients.
//! - Provide the context handed to hooks, through which components reach the
//!   manager (reentrant calls are allowed on the same thread).
//!
//! # Invariants
//! - Every hook has a no-op default; absence is never an error.
//! - The hook set is read once per instantiation through `Component::hooks`.
//! - Hook failures and panics are converted into `ComponentError` values.

pub mod instance;
pub mod registration;

use crate::extension::Extension;
use crate::manager::{ComponentManager, ManagerInner};
use crate::model::descriptor::ComponentDescriptor;
use crate::model::name::ComponentName;
use bitflags::bitflags;
use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

bitflags! {
    /// Hooks a component implementation actually wants invoked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LifecycleHooks: u8 {
        const ACTIVATE = 1;
        const DEACTIVATE = 1 << 1;
        const START = 1 << 2;
        const STOP = 1 << 3;
        const EXTENSIONS = 1 << 4;
    }
}

/// Factory building a component implementation at instantiation time.
pub type ComponentFactory =
    Arc<dyn Fn(&ComponentContext) -> Result<Arc<dyn Component>, ComponentError> + Send + Sync>;

/// Executable side of a component. All hooks are optional.
pub trait Component: Send + Sync {
    fn hooks(&self) -> LifecycleHooks {
        LifecycleHooks::all()
    }

    fn activate(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }

    fn deactivate(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }

    fn start(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }

    fn stop(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }

    fn register_extension(
        &self,
        _ctx: &ComponentContext,
        _extension: &Extension,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    fn unregister_extension(
        &self,
        _ctx: &ComponentContext,
        _extension: &Extension,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Service object exposed under `service`, if any.
    fn adapter(&self, _service: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// Context handed to every hook of one component.
#[derive(Clone)]
pub struct ComponentContext {
    name: ComponentName,
    properties: BTreeMap<String, String>,
    manager: Weak<ManagerInner>,
}

impl ComponentContext {
    pub(crate) fn new(descriptor: &ComponentDescriptor, manager: Weak<ManagerInner>) -> Self {
        Self {
            name: descriptor.name.clone(),
            properties: descriptor.properties.clone(),
            manager,
        }
    }

    /// Context not attached to any manager.
    pub fn detached(descriptor: &ComponentDescriptor) -> Self {
        Self::new(descriptor, Weak::new())
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Owning manager, or `None` once it has been dropped.
    pub fn manager(&self) -> Option<ComponentManager> {
        self.manager.upgrade().map(ComponentManager::from_inner)
    }
}

/// Failure reported by a component hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    Failed(String),
    Panicked(String),
}

impl ComponentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl Display for ComponentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "{message}"),
            Self::Panicked(message) => write!(f, "hook panicked: {message}"),
        }
    }
}

impl Error for ComponentError {}

impl From<String> for ComponentError {
    fn from(value: String) -> Self {
        Self::Failed(value)
    }
}

impl From<&str> for ComponentError {
    fn from(value: &str) -> Self {
        Self::Failed(value.to_string())
    }
}

/// Runs one hook, turning panics into `ComponentError::Panicked`.
pub(crate) fn call_guarded<T, F>(hook: F) -> Result<T, ComponentError>
where
    F: FnOnce() -> Result<T, ComponentError>,
{
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(text) = payload.downcast_ref::<&str>() {
                (*text).to_string()
            } else if let Some(text) = payload.downcast_ref::<String>() {
                text.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Err(ComponentError::Panicked(message))
        }
    }
}
