//! Runtime notifications.
//!
//! # Responsibility
//! - `ComponentListener`: per-component and per-extension events.
//! - `RuntimeListener`: manager-wide phase callbacks around activation,
//!   deactivation, start and stop.
//!
//! # Invariants
//! - Listeners are invoked with no manager borrow held; they may call back
//!   into the manager on the same thread.
//! - Start callbacks follow listener registration order, stop callbacks the
//!   reverse order.

use crate::extension::Extension;
use crate::manager::ComponentManager;
use crate::model::name::ComponentName;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentEventKind {
    ComponentRegistered,
    ComponentUnregistered,
    ComponentActivated,
    ComponentDeactivated,
    ComponentStarted,
    ComponentStopped,
    ExtensionRegistered,
    ExtensionPending,
    ExtensionUnregistered,
}

impl ComponentEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ComponentRegistered => "component_registered",
            Self::ComponentUnregistered => "component_unregistered",
            Self::ComponentActivated => "component_activated",
            Self::ComponentDeactivated => "component_deactivated",
            Self::ComponentStarted => "component_started",
            Self::ComponentStopped => "component_stopped",
            Self::ExtensionRegistered => "extension_registered",
            Self::ExtensionPending => "extension_pending",
            Self::ExtensionUnregistered => "extension_unregistered",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub kind: ComponentEventKind,
    /// Component the event is about; for extension events, the target.
    pub component: ComponentName,
    pub extension: Option<Arc<Extension>>,
}

impl ComponentEvent {
    pub fn component(kind: ComponentEventKind, component: ComponentName) -> Self {
        Self {
            kind,
            component,
            extension: None,
        }
    }

    pub fn extension(kind: ComponentEventKind, extension: Arc<Extension>) -> Self {
        Self {
            kind,
            component: extension.target().clone(),
            extension: Some(extension),
        }
    }
}

impl Display for ComponentEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.extension {
            Some(extension) => write!(f, "{} {}", self.kind.as_str(), extension),
            None => write!(f, "{} {}", self.kind.as_str(), self.component),
        }
    }
}

pub trait ComponentListener: Send + Sync {
    fn handle_event(&self, event: &ComponentEvent);
}

/// Manager-wide phase callbacks. Every method defaults to a no-op.
pub trait RuntimeListener: Send + Sync {
    fn before_activation(&self, _manager: &ComponentManager) {}

    fn after_activation(&self, _manager: &ComponentManager) {}

    fn before_deactivation(&self, _manager: &ComponentManager) {}

    fn after_deactivation(&self, _manager: &ComponentManager) {}

    fn before_start(&self, _manager: &ComponentManager, _is_resume: bool) {}

    fn after_start(&self, _manager: &ComponentManager, _is_resume: bool) {}

    fn before_stop(&self, _manager: &ComponentManager, _is_standby: bool) {}

    fn after_stop(&self, _manager: &ComponentManager, _is_standby: bool) {}
}

#[cfg(test)]
mod tests {
    use super::{ComponentEvent, ComponentEventKind};
    use crate::extension::Extension;
    use crate::model::name::ComponentName;
    use std::sync::Arc;

    fn name(raw: &str) -> ComponentName {
        ComponentName::parse(raw).expect("valid name")
    }

    #[test]
    fn extension_events_name_their_target() {
        let extension = Arc::new(Extension::new(name("a"), name("b"), "types", vec![]));
        let event = ComponentEvent::extension(ComponentEventKind::ExtensionPending, extension);
        assert_eq!(event.component, name("b"));
        assert!(event.to_string().starts_with("extension_pending service:a -> service:b:types"));
    }
}
