//! Component manager: the orchestration state machine.
//!
//! # Responsibility
//! - Accept component registrations and route them to the dependency
//!   registry, or to the stash while running.
//! - Drive activate/start and stop/deactivate sweeps, standby/resume,
//!   snapshot/reset and stash application.
//! - Deliver extensions to live targets and queue the rest.
//!
//! # Invariants
//! - Every public mutation runs under one reentrant manager lock; component
//!   hooks and listeners run with no interior borrow held, so they may call
//!   back into the manager from the same thread.
//! - Registration conflicts and component failures are reported, never
//!   raised; only stop failures propagate to the caller.
//! - `changed` latches once the registry is mutated after a snapshot.
//!
//! # See also
//! - `lifecycle` for the activation/start/stop sweeps.
//! - `extensions` for extension routing and the pending queue.

mod extensions;
mod lifecycle;
pub mod stash;
mod timeout;

use crate::component::instance::ComponentInstance;
use crate::component::registration::RegistrationInfo;
use crate::component::{Component, ComponentContext, ComponentError, ComponentFactory};
use crate::config::RuntimeConfig;
use crate::diagnostics::{MessageCollector, MessageHandler, MessageSource, RuntimeMessage};
use crate::events::{ComponentEvent, ComponentEventKind, ComponentListener, RuntimeListener};
use crate::extension::pending::PendingExtensions;
use crate::extension::points::PointRegistries;
use crate::extension::registry::{ContributionRegistry, MapRegistry, RegistryCatalog};
use crate::extension::Extension;
use crate::manager::stash::Stash;
use crate::model::descriptor::{ComponentDescriptor, Implementation};
use crate::model::name::ComponentName;
use crate::model::state::ComponentState;
use crate::registry::{ComponentRegistry, DependencyRegistry, RegistryError};
use indexmap::IndexSet;
use log::{debug, error, info};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Result of one `register` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Registered and resolved.
    Registered,
    /// Registered, waiting on the listed dependencies.
    Pending(BTreeSet<ComponentName>),
    /// Deferred until the next stash application.
    Stashed,
    /// Ignored because the bare name is blacklisted.
    Blacklisted,
    Rejected(RegistrationError),
}

impl RegistrationOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_) | Self::Blacklisted)
    }
}

/// Registration-time failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    Conflict(RegistryError),
    UnknownImplementation {
        component: ComponentName,
        implementation: String,
    },
}

impl Display for RegistrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict(err) => write!(f, "{err}"),
            Self::UnknownImplementation {
                component,
                implementation,
            } => write!(
                f,
                "component {component} references unknown implementation `{implementation}`"
            ),
        }
    }
}

impl Error for RegistrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conflict(err) => Some(err),
            Self::UnknownImplementation { .. } => None,
        }
    }
}

impl From<RegistryError> for RegistrationError {
    fn from(value: RegistryError) -> Self {
        Self::Conflict(value)
    }
}

/// Failures propagated from stop-type operations.
#[derive(Debug)]
pub enum LifecycleError {
    StopFailed {
        component: ComponentName,
        source: ComponentError,
    },
    /// The bounded-call worker died before reporting.
    WorkerLost,
    Worker(std::io::Error),
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopFailed { component, source } => {
                write!(f, "failed to stop component {component}: {source}")
            }
            Self::WorkerLost => write!(f, "lifecycle worker terminated without a result"),
            Self::Worker(err) => write!(f, "failed to spawn lifecycle worker: {err}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StopFailed { source, .. } => Some(source),
            Self::WorkerLost => None,
            Self::Worker(err) => Some(err),
        }
    }
}

struct ManagerState {
    registry: Box<dyn DependencyRegistry>,
    snapshot: Option<Box<dyn DependencyRegistry>>,
    changed: bool,
    flushing_stash: bool,
    /// Start-ordered records while started.
    started: Option<Vec<Arc<RegistrationInfo>>>,
    /// Records to restart on resume while in standby.
    standby: Option<Vec<Arc<RegistrationInfo>>>,
    registries: PointRegistries,
    /// Extensions currently applied, keyed by target primary name.
    applied: HashMap<ComponentName, IndexSet<Arc<Extension>>>,
    services: BTreeMap<String, ComponentName>,
    blacklist: BTreeSet<String>,
    locations: BTreeMap<String, ComponentName>,
}

pub(crate) struct ManagerInner {
    lock: ReentrantMutex<RefCell<ManagerState>>,
    pending: PendingExtensions,
    stash: Mutex<Stash>,
    messages: Arc<dyn MessageHandler>,
    config: RuntimeConfig,
    component_listeners: RwLock<Vec<Arc<dyn ComponentListener>>>,
    listeners: RwLock<Vec<Arc<dyn RuntimeListener>>>,
    implementations: RwLock<HashMap<String, ComponentFactory>>,
    registry_kinds: RwLock<RegistryCatalog>,
}

/// Builder for `ComponentManager`.
pub struct ManagerBuilder {
    config: RuntimeConfig,
    registry: Option<Box<dyn DependencyRegistry>>,
    messages: Option<Arc<dyn MessageHandler>>,
}

impl ManagerBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default in-memory `ComponentRegistry`.
    pub fn registry(mut self, registry: Box<dyn DependencyRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.messages = Some(handler);
        self
    }

    pub fn build(self) -> ComponentManager {
        let state = ManagerState {
            registry: self
                .registry
                .unwrap_or_else(|| Box::new(ComponentRegistry::new())),
            snapshot: None,
            changed: false,
            flushing_stash: false,
            started: None,
            standby: None,
            registries: PointRegistries::new(),
            applied: HashMap::new(),
            services: BTreeMap::new(),
            blacklist: self.config.blacklist.clone(),
            locations: BTreeMap::new(),
        };
        let messages = self
            .messages
            .unwrap_or_else(|| Arc::new(MessageCollector::new()));
        ComponentManager {
            inner: Arc::new(ManagerInner {
                lock: ReentrantMutex::new(RefCell::new(state)),
                pending: PendingExtensions::new(),
                stash: Mutex::new(Stash::new()),
                messages,
                config: self.config,
                component_listeners: RwLock::new(Vec::new()),
                listeners: RwLock::new(Vec::new()),
                implementations: RwLock::new(HashMap::new()),
                registry_kinds: RwLock::new(RegistryCatalog::default()),
            }),
        }
    }
}

/// Shared handle to one component runtime. Clones share the same runtime.
#[derive(Clone)]
pub struct ComponentManager {
    inner: Arc<ManagerInner>,
}

impl Default for ComponentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ComponentManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.len())
            .field("started", &self.is_started())
            .field("standby", &self.is_standby())
            .finish()
    }
}

impl ComponentManager {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder {
            config: RuntimeConfig::default(),
            registry: None,
            messages: None,
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    // ---- registration -------------------------------------------------

    /// Registers one component, or stashes it while running.
    pub fn register(&self, descriptor: impl Into<Arc<ComponentDescriptor>>) -> RegistrationOutcome {
        let descriptor = descriptor.into();
        let _guard = self.inner.lock.lock();
        let name = descriptor.name.clone();

        if self.with_state(|state| state.blacklist.contains(name.name())) {
            debug!(
                "event=component_register module=manager status=blacklisted component={}",
                name
            );
            return RegistrationOutcome::Blacklisted;
        }

        if let Some(Implementation::Named(reference)) = &descriptor.implementation {
            if !self.inner.implementations.read().contains_key(reference) {
                return self.reject(
                    &name,
                    RegistrationError::UnknownImplementation {
                        component: name.clone(),
                        implementation: reference.clone(),
                    },
                );
            }
        }

        if let Err(conflict) = self.check_duplicates(&descriptor) {
            return self.reject(&name, conflict.into());
        }

        if self.should_stash() {
            self.inner.stash.lock().add(descriptor);
            info!(
                "event=component_register module=manager status=stashed component={}",
                name
            );
            return RegistrationOutcome::Stashed;
        }

        let record = Arc::new(RegistrationInfo::new(Arc::clone(&descriptor)));
        record.set_state(ComponentState::Pending);
        let added = self.with_state(|state| {
            if state.snapshot.is_some() {
                state.changed = true;
            }
            let added = state.registry.add_component(Arc::clone(&record));
            if added.is_ok() {
                if let Some(location) = &descriptor.source_location {
                    state.locations.insert(location.clone(), name.clone());
                }
            }
            added
        });

        match added {
            Ok(resolved) => {
                for resolved_record in &resolved {
                    resolved_record.set_state(ComponentState::Resolved);
                }
                self.emit(ComponentEvent::component(
                    ComponentEventKind::ComponentRegistered,
                    name.clone(),
                ));
                if resolved.is_empty() {
                    let missing = self.with_state(|state| state.registry.missing_dependencies(&name));
                    info!(
                        "event=component_register module=manager status=pending component={} missing={}",
                        name,
                        missing.len()
                    );
                    RegistrationOutcome::Pending(missing)
                } else {
                    debug!(
                        "event=component_register module=manager status=ok component={} resolved={}",
                        name,
                        resolved.len()
                    );
                    RegistrationOutcome::Registered
                }
            }
            Err(conflict) => {
                record.set_state(ComponentState::Unregistered);
                self.reject(&name, conflict.into())
            }
        }
    }

    pub fn register_all<I, D>(&self, descriptors: I) -> Vec<RegistrationOutcome>
    where
        I: IntoIterator<Item = D>,
        D: Into<Arc<ComponentDescriptor>>,
    {
        let _guard = self.inner.lock.lock();
        descriptors
            .into_iter()
            .map(|descriptor| self.register(descriptor))
            .collect()
    }

    /// Unregisters `name` (primary or alias), or stashes the removal while
    /// running. Returns false when nothing was known under that name.
    pub fn unregister(&self, name: &ComponentName) -> bool {
        let _guard = self.inner.lock.lock();
        if self.should_stash() {
            self.inner.stash.lock().remove(name.clone());
            info!(
                "event=component_unregister module=manager status=stashed component={}",
                name
            );
            return true;
        }

        let Some(record) = self.with_state(|state| state.registry.get_component(name)) else {
            debug!(
                "event=component_unregister module=manager status=unknown component={}",
                name
            );
            return false;
        };
        if let Err(err) = self.teardown(&record) {
            error!(
                "event=component_unregister module=manager status=stop_failed component={} error={}",
                name, err
            );
        }

        let removal = self.with_state(|state| {
            if state.snapshot.is_some() {
                state.changed = true;
            }
            let removal = state.registry.remove_component(name);
            if let Some(removal) = &removal {
                let primary = removal.removed.name();
                state.locations.retain(|_, owner| owner != primary);
            }
            removal
        });
        let Some(removal) = removal else {
            return false;
        };

        let primary = removal.removed.name().clone();
        removal.removed.set_state(ComponentState::Unregistered);
        for dependent in &removal.unresolved {
            dependent.set_state(ComponentState::Pending);
        }
        let dropped = self.inner.pending.remove_from_origin(&primary);
        let contributed: Vec<Arc<Extension>> = self.with_state(|state| {
            state
                .applied
                .values()
                .flatten()
                .filter(|extension| extension.origin() == &primary)
                .cloned()
                .collect()
        });
        let withdrawn = contributed
            .iter()
            .filter(|extension| self.unregister_extension(extension))
            .count();
        info!(
            "event=component_unregister module=manager status=ok component={} unresolved={} dropped_extensions={} withdrawn_extensions={}",
            primary,
            removal.unresolved.len(),
            dropped,
            withdrawn
        );
        self.emit(ComponentEvent::component(
            ComponentEventKind::ComponentUnregistered,
            primary,
        ));
        true
    }

    /// Unregisters the component deployed from `location`.
    pub fn unregister_by_location(&self, location: &str) -> bool {
        let _guard = self.inner.lock.lock();
        match self.with_state(|state| state.locations.remove(location)) {
            Some(name) => self.unregister(&name),
            None => false,
        }
    }

    pub fn has_component_from_location(&self, location: &str) -> bool {
        self.with_state(|state| state.locations.contains_key(location))
    }

    // ---- catalogs and settings ----------------------------------------

    /// Makes `factory` available to descriptors declaring
    /// `implementation_ref(name)`.
    pub fn register_implementation<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentContext) -> Result<Arc<dyn Component>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        self.inner
            .implementations
            .write()
            .insert(name.into(), Arc::new(factory));
    }

    /// Adds a registry factory for extension points declaring `kind`.
    pub fn register_registry_kind<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ContributionRegistry> + Send + Sync + 'static,
    {
        self.inner.registry_kinds.write().insert(kind, factory);
    }

    pub fn set_blacklist<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.with_state(|state| state.blacklist = names);
    }

    pub fn blacklist(&self) -> BTreeSet<String> {
        self.with_state(|state| state.blacklist.clone())
    }

    pub fn add_component_listener(&self, listener: Arc<dyn ComponentListener>) {
        self.inner.component_listeners.write().push(listener);
    }

    pub fn remove_component_listener(&self, listener: &Arc<dyn ComponentListener>) {
        self.inner
            .component_listeners
            .write()
            .retain(|candidate| !Arc::ptr_eq(candidate, listener));
    }

    pub fn add_listener(&self, listener: Arc<dyn RuntimeListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn RuntimeListener>) {
        self.inner
            .listeners
            .write()
            .retain(|candidate| !Arc::ptr_eq(candidate, listener));
    }

    // ---- introspection ------------------------------------------------

    pub fn registrations(&self) -> Vec<Arc<RegistrationInfo>> {
        self.with_state(|state| state.registry.components())
    }

    /// Resolved records, leaves first.
    pub fn resolved_registrations(&self) -> Vec<Arc<RegistrationInfo>> {
        self.with_state(|state| state.registry.resolved_registration_info())
    }

    /// Pending component to its missing dependencies.
    pub fn pending_registrations(&self) -> BTreeMap<ComponentName, BTreeSet<ComponentName>> {
        self.with_state(|state| state.registry.pending_components())
    }

    /// Queued extensions grouped by contributing component.
    pub fn missing_registrations(&self) -> BTreeMap<ComponentName, Vec<Arc<Extension>>> {
        self.inner.pending.by_origin()
    }

    /// Dependencies named by pending components that nobody registered.
    pub fn needed_registrations(&self) -> BTreeSet<ComponentName> {
        self.with_state(|state| {
            state
                .registry
                .pending_components()
                .into_values()
                .flatten()
                .filter(|dependency| !state.registry.contains(dependency))
                .collect()
        })
    }

    pub fn activating_registrations(&self) -> Vec<ComponentName> {
        self.names_in_state(ComponentState::Activating)
    }

    pub fn start_failure_registrations(&self) -> Vec<ComponentName> {
        self.names_in_state(ComponentState::StartFailure)
    }

    pub fn registration(&self, name: &ComponentName) -> Option<Arc<RegistrationInfo>> {
        self.with_state(|state| state.registry.get_component(name))
    }

    pub fn state_of(&self, name: &ComponentName) -> Option<ComponentState> {
        self.registration(name).map(|record| record.state())
    }

    /// Extensions queued for `name`, following aliases to the primary name.
    pub fn pending_extensions_for(&self, name: &ComponentName) -> Vec<Arc<Extension>> {
        let primary = self
            .registration(name)
            .map(|record| record.name().clone())
            .unwrap_or_else(|| name.clone());
        self.inner.pending.pending_for(&primary)
    }

    pub fn is_started(&self) -> bool {
        self.with_state(|state| state.started.is_some())
    }

    pub fn is_standby(&self) -> bool {
        self.with_state(|state| state.standby.is_some())
    }

    pub fn is_running(&self) -> bool {
        self.with_state(|state| state.started.is_some() || state.standby.is_some())
    }

    pub fn has_snapshot(&self) -> bool {
        self.with_state(|state| state.snapshot.is_some())
    }

    pub fn has_changed(&self) -> bool {
        self.with_state(|state| state.changed)
    }

    pub fn is_stash_empty(&self) -> bool {
        self.inner.stash.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.with_state(|state| state.registry.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the currently indexed provided services.
    pub fn services(&self) -> Vec<String> {
        self.with_state(|state| state.services.keys().cloned().collect())
    }

    pub fn component_providing_service(&self, service: &str) -> Option<Arc<ComponentInstance>> {
        let provider = self.with_state(|state| {
            let name = state.services.get(service)?;
            state.registry.get_component(name)
        })?;
        let instance = provider.instance();
        if instance.is_none() {
            debug!(
                "event=service_lookup module=manager status=inactive service={} component={}",
                service,
                provider.name()
            );
        }
        instance
    }

    /// Typed service object exposed through the provider's `adapter` hook.
    pub fn service<T>(&self, service: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.component_providing_service(service)?
            .adapter(service)?
            .downcast::<T>()
            .ok()
    }

    /// Runs `read` against the registry of `component`'s point `point`.
    ///
    /// `read` must not call back into the manager.
    pub fn with_extension_point_registry<R>(
        &self,
        component: &ComponentName,
        point: &str,
        read: impl FnOnce(&dyn ContributionRegistry) -> R,
    ) -> Option<R> {
        let _guard = self.inner.lock.lock();
        let primary = self.registration(component)?.name().clone();
        self.with_state(|state| state.registries.get(&primary, point).map(read))
    }

    /// Enables or disables contribution `id` on `component`'s point `point`.
    ///
    /// Returns false when the point has no live registry.
    pub fn set_contribution_enabled(
        &self,
        component: &ComponentName,
        point: &str,
        id: &str,
        enabled: bool,
    ) -> bool {
        let _guard = self.inner.lock.lock();
        let Some(primary) = self.registration(component).map(|record| record.name().clone())
        else {
            return false;
        };
        self.with_state(|state| match state.registries.get_mut(&primary, point) {
            Some(registry) => {
                if enabled {
                    registry.enable(id);
                } else {
                    registry.disable(id);
                }
                true
            }
            None => false,
        })
    }

    /// Effective `(id, contribution)` pairs of a `MapRegistry`-backed point.
    pub fn map_contributions(
        &self,
        component: &ComponentName,
        point: &str,
    ) -> Option<Vec<(String, Value)>> {
        self.with_extension_point_registry(component, point, |registry| {
            registry.as_any().downcast_ref::<MapRegistry>().map(|map| {
                map.contributions()
                    .into_iter()
                    .map(|(id, value)| (id.to_string(), value.clone()))
                    .collect()
            })
        })
        .flatten()
    }

    // ---- internals ----------------------------------------------------

    /// Short exclusive access to the interior state.
    ///
    /// `update` must not invoke hooks, listeners or `with_state` itself.
    fn with_state<R>(&self, update: impl FnOnce(&mut ManagerState) -> R) -> R {
        let guard = self.inner.lock.lock();
        let mut state = guard.borrow_mut();
        update(&mut state)
    }

    fn should_stash(&self) -> bool {
        self.with_state(|state| {
            (state.started.is_some() || state.standby.is_some()) && !state.flushing_stash
        })
    }

    /// Every name of `descriptor` must be free, both among stashed
    /// additions and in the registry. A registered name only counts as free
    /// when its owner has a stashed removal.
    fn check_duplicates(&self, descriptor: &ComponentDescriptor) -> Result<(), RegistryError> {
        let name = &descriptor.name;
        let taken = |candidate: &ComponentName| {
            if candidate == name {
                RegistryError::DuplicateName(name.clone())
            } else {
                RegistryError::DuplicateAlias {
                    alias: candidate.clone(),
                    component: name.clone(),
                }
            }
        };

        let stash = self.inner.stash.lock();
        if let Some(candidate) = descriptor.all_names().find(|candidate| stash.is_adding(*candidate)) {
            return Err(taken(candidate));
        }
        self.with_state(|state| {
            let replaced = |candidate: &ComponentName| {
                state.registry.get_component(candidate).is_some_and(|owner| {
                    owner
                        .descriptor()
                        .all_names()
                        .any(|owned| stash.is_removing(owned))
                })
            };
            match descriptor
                .all_names()
                .find(|candidate| state.registry.contains(*candidate) && !replaced(*candidate))
            {
                Some(candidate) => Err(taken(candidate)),
                None => Ok(()),
            }
        })
    }

    fn reject(&self, name: &ComponentName, error: RegistrationError) -> RegistrationOutcome {
        self.handle_error(
            format!("failed to register component {name}: {error}"),
            MessageSource::Component,
            name,
        );
        RegistrationOutcome::Rejected(error)
    }

    fn names_in_state(&self, wanted: ComponentState) -> Vec<ComponentName> {
        self.registrations()
            .into_iter()
            .filter(|record| record.state() == wanted)
            .map(|record| record.name().clone())
            .collect()
    }

    /// Logs `message` and forwards it to the diagnostics sink.
    fn handle_error(&self, message: String, source: MessageSource, source_id: &ComponentName) {
        error!(
            "event=component_error module=manager status=error component={} message={}",
            source_id, message
        );
        self.inner
            .messages
            .add_message(RuntimeMessage::error(message, source, source_id.as_str()));
    }

    fn emit(&self, event: ComponentEvent) {
        log::trace!("event=component_event module=manager detail={}", event);
        let listeners = self.inner.component_listeners.read().clone();
        for listener in listeners {
            listener.handle_event(&event);
        }
    }

    /// Calls `notify` on every runtime listener, in reverse order if asked.
    fn notify_listeners(&self, reverse: bool, notify: impl Fn(&dyn RuntimeListener)) {
        let listeners = self.inner.listeners.read().clone();
        if reverse {
            listeners.iter().rev().for_each(|listener| notify(listener.as_ref()));
        } else {
            listeners.iter().for_each(|listener| notify(listener.as_ref()));
        }
    }
}
