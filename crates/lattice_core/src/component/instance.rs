//! Live wrapper around one component implementation.
//!
//! # Responsibility
//! - Own the implementation built at instantiation and the context its hooks
//!   receive.
//! - Invoke only the hooks the implementation declared, with panics caught.
//! - Route extensions aimed at delegating points to the super component.

use crate::component::{
    call_guarded, Component, ComponentContext, ComponentError, ComponentFactory, LifecycleHooks,
};
use crate::extension::Extension;
use crate::manager::ManagerInner;
use crate::model::descriptor::{ComponentDescriptor, ExtensionPointDecl};
use crate::model::name::ComponentName;
use log::debug;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

/// Where an extension aimed at this instance must be applied.
#[derive(Debug)]
pub(crate) enum ExtensionRoute<'a> {
    /// Target point is declared here.
    Local(&'a ExtensionPointDecl),
    /// Target point forwards to another component.
    Delegated(Extension),
    /// Target point is not declared by this component.
    UnknownPoint,
}

pub struct ComponentInstance {
    descriptor: Arc<ComponentDescriptor>,
    context: ComponentContext,
    implementation: Option<Arc<dyn Component>>,
    hooks: LifecycleHooks,
}

impl ComponentInstance {
    /// Builds the implementation through `factory`, if any.
    pub(crate) fn build(
        descriptor: Arc<ComponentDescriptor>,
        factory: Option<ComponentFactory>,
        manager: Weak<ManagerInner>,
    ) -> Result<Self, ComponentError> {
        let context = ComponentContext::new(&descriptor, manager);
        let implementation = match factory {
            Some(factory) => Some(call_guarded(|| factory(&context))?),
            None => None,
        };
        let hooks = implementation
            .as_ref()
            .map(|component| component.hooks())
            .unwrap_or_else(LifecycleHooks::empty);
        debug!(
            "event=instantiate module=component status=ok component={} hooks={:?}",
            descriptor.name, hooks
        );
        Ok(Self {
            descriptor,
            context,
            implementation,
            hooks,
        })
    }

    pub fn name(&self) -> &ComponentName {
        &self.descriptor.name
    }

    pub fn context(&self) -> &ComponentContext {
        &self.context
    }

    pub fn hooks(&self) -> LifecycleHooks {
        self.hooks
    }

    pub fn implementation(&self) -> Option<&Arc<dyn Component>> {
        self.implementation.as_ref()
    }

    pub(crate) fn activate(&self) -> Result<(), ComponentError> {
        self.invoke(LifecycleHooks::ACTIVATE, |component, ctx| {
            component.activate(ctx)
        })
    }

    pub(crate) fn deactivate(&self) -> Result<(), ComponentError> {
        self.invoke(LifecycleHooks::DEACTIVATE, |component, ctx| {
            component.deactivate(ctx)
        })
    }

    pub(crate) fn start(&self) -> Result<(), ComponentError> {
        self.invoke(LifecycleHooks::START, |component, ctx| component.start(ctx))
    }

    pub(crate) fn stop(&self) -> Result<(), ComponentError> {
        self.invoke(LifecycleHooks::STOP, |component, ctx| component.stop(ctx))
    }

    pub(crate) fn register_extension(&self, extension: &Extension) -> Result<(), ComponentError> {
        self.invoke(LifecycleHooks::EXTENSIONS, |component, ctx| {
            component.register_extension(ctx, extension)
        })
    }

    pub(crate) fn unregister_extension(&self, extension: &Extension) -> Result<(), ComponentError> {
        self.invoke(LifecycleHooks::EXTENSIONS, |component, ctx| {
            component.unregister_extension(ctx, extension)
        })
    }

    /// Decides whether `extension` stays here or moves to a super component.
    pub(crate) fn route(&self, extension: &Extension) -> ExtensionRoute<'_> {
        let Some(point) = self.descriptor.extension_point(extension.point()) else {
            return ExtensionRoute::UnknownPoint;
        };
        match &point.delegate {
            Some(delegate) if delegate.component != self.descriptor.name => {
                let target_point = delegate.point.as_deref().unwrap_or(&point.name);
                ExtensionRoute::Delegated(
                    extension.retarget(delegate.component.clone(), target_point),
                )
            }
            _ => ExtensionRoute::Local(point),
        }
    }

    pub fn adapter(&self, service: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        let component = self.implementation.as_ref()?;
        call_guarded(|| Ok(component.adapter(service))).ok().flatten()
    }

    fn invoke<F>(&self, hook: LifecycleHooks, call: F) -> Result<(), ComponentError>
    where
        F: FnOnce(&dyn Component, &ComponentContext) -> Result<(), ComponentError>,
    {
        match &self.implementation {
            Some(component) if self.hooks.contains(hook) => {
                call_guarded(|| call(component.as_ref(), &self.context))
            }
            _ => Ok(()),
        }
    }
}

impl Debug for ComponentInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.descriptor.name)
            .field("hooks", &self.hooks)
            .field("implementation", &self.implementation.is_some())
            .finish()
    }
}
