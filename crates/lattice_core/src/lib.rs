//! Component lifecycle and extension-registration runtime.
//!
//! Components declare dependencies, extension points and contributions;
//! the `ComponentManager` resolves them, drives their lifecycle and routes
//! contributions between them.

pub mod component;
pub mod config;
pub mod diagnostics;
pub mod events;
pub mod extension;
pub mod logging;
pub mod manager;
pub mod model;
pub mod registry;

pub use component::instance::ComponentInstance;
pub use component::registration::RegistrationInfo;
pub use component::{Component, ComponentContext, ComponentError, ComponentFactory, LifecycleHooks};
pub use config::{ConfigError, ReloadStrategy, RuntimeConfig};
pub use diagnostics::{MessageCollector, MessageHandler, MessageLevel, MessageSource, RuntimeMessage};
pub use events::{ComponentEvent, ComponentEventKind, ComponentListener, RuntimeListener};
pub use extension::registry::{ContributionError, ContributionRegistry, MapRegistry};
pub use extension::{Extension, ExtensionId};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use manager::{
    ComponentManager, LifecycleError, ManagerBuilder, RegistrationError, RegistrationOutcome,
};
pub use model::descriptor::{
    ComponentDescriptor, DescriptorBuilder, DescriptorError, ExtensionPointDecl, Implementation,
};
pub use model::name::{ComponentName, NameError};
pub use model::state::ComponentState;
pub use registry::{ComponentRegistry, DependencyRegistry, RegistryError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
