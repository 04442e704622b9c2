//! Activation, start, stop and deactivation sweeps, plus the stash and
//! snapshot flows built on top of them.
//!
//! # Invariants
//! - Start runs in ascending `(start_order, bare name)`; stop walks the
//!   started list in reverse.
//! - A failing hook only affects its own component: one diagnostic, the
//!   sweep continues.
//! - A stop failure is not isolated: the sweep ends there, nothing is
//!   deactivated and the error is returned. The manager still counts as
//!   stopped.

use super::stash::Stash;
use super::timeout::run_within;
use super::{ComponentManager, LifecycleError};
use crate::component::instance::ComponentInstance;
use crate::component::registration::RegistrationInfo;
use crate::config::ReloadStrategy;
use crate::diagnostics::MessageSource;
use crate::events::{ComponentEvent, ComponentEventKind};
use crate::model::descriptor::Implementation;
use crate::model::state::ComponentState;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

fn sort_for_start(records: &mut [Arc<RegistrationInfo>]) {
    records.sort_by(|left, right| {
        left.start_order()
            .cmp(&right.start_order())
            .then_with(|| left.name().name().cmp(right.name().name()))
    });
}

fn first_error(
    current: Result<(), LifecycleError>,
    next: Result<(), LifecycleError>,
) -> Result<(), LifecycleError> {
    current.and(next)
}

impl ComponentManager {
    /// Activates and starts every resolved component.
    ///
    /// Returns false when already started. In standby this resumes instead.
    pub fn start(&self) -> bool {
        let _guard = self.inner.lock.lock();
        if self.is_started() {
            return false;
        }
        if self.is_standby() {
            return self.resume();
        }

        info!(
            "event=manager_start module=manager status=begin components={}",
            self.len()
        );
        let mut activated = self.activate_components();
        sort_for_start(&mut activated);
        let count = activated.len();
        self.start_components(activated, false);
        info!(
            "event=manager_start module=manager status=ok started={} failures={}",
            count,
            self.start_failure_registrations().len()
        );
        true
    }

    /// Stops and deactivates everything. Returns `Ok(false)` when idle.
    ///
    /// When a component refuses to stop, components not yet reached keep
    /// their state and no deactivation runs.
    pub fn stop(&self) -> Result<bool, LifecycleError> {
        let _guard = self.inner.lock.lock();
        let (started, standby) = self.with_state(|state| (state.started.is_some(), state.standby.is_some()));
        if !started && !standby {
            return Ok(false);
        }

        info!(
            "event=manager_stop module=manager status=begin from_standby={}",
            standby
        );
        let stopped = if started {
            self.stop_components(false)
        } else {
            Ok(())
        };
        if stopped.is_ok() {
            self.deactivate_components(true);
        }
        self.with_state(|state| {
            state.started = None;
            state.standby = None;
        });
        match &stopped {
            Ok(()) => info!("event=manager_stop module=manager status=ok"),
            Err(err) => warn!(
                "event=manager_stop module=manager status=aborted error={}",
                err
            ),
        }
        stopped.map(|()| true)
    }

    /// `stop` on a worker thread, warning when `timeout` elapses first.
    ///
    /// Must not be called from inside a component hook.
    pub fn stop_within(&self, timeout: Duration) -> Result<bool, LifecycleError> {
        let manager = self.clone();
        run_within(timeout, "stop", move || manager.stop())
    }

    /// Stops started components but keeps them activated.
    pub fn standby(&self) -> Result<bool, LifecycleError> {
        let _guard = self.inner.lock.lock();
        if !self.is_started() {
            return Ok(false);
        }
        info!("event=manager_standby module=manager status=begin");
        let stopped = self.stop_components(true);
        self.with_state(|state| state.standby = state.started.take());
        stopped.map(|()| true)
    }

    /// `standby` on a worker thread, warning when `timeout` elapses first.
    pub fn standby_within(&self, timeout: Duration) -> Result<bool, LifecycleError> {
        let manager = self.clone();
        run_within(timeout, "standby", move || manager.standby())
    }

    /// Restarts exactly the components remembered by `standby`.
    pub fn resume(&self) -> bool {
        let _guard = self.inner.lock.lock();
        let Some(remembered) = self.with_state(|state| state.standby.clone()) else {
            return false;
        };
        info!(
            "event=manager_resume module=manager status=begin components={}",
            remembered.len()
        );
        self.start_components(remembered, true);
        self.with_state(|state| state.standby = None);
        true
    }

    /// Captures the dependency registry; later registrations mark it changed.
    pub fn snapshot(&self) {
        let _guard = self.inner.lock.lock();
        self.with_state(|state| {
            state.snapshot = Some(state.registry.snapshot());
            state.changed = false;
        });
        info!(
            "event=manager_snapshot module=manager status=ok components={}",
            self.len()
        );
    }

    /// Stops, then restores the snapshot if anything changed since.
    ///
    /// Returns whether the manager was running before the call.
    pub fn reset(&self) -> Result<bool, LifecycleError> {
        let _guard = self.inner.lock.lock();
        let stopped = self.stop();
        let restored = self.with_state(|state| {
            if !state.changed {
                return false;
            }
            let Some(snapshot) = &state.snapshot else {
                return false;
            };
            state.registry = snapshot.snapshot();
            state.changed = false;
            state.registries.clear();
            state.services.clear();
            state.applied.clear();
            state.locations = state
                .registry
                .components()
                .into_iter()
                .filter_map(|record| {
                    let location = record.descriptor().source_location.clone()?;
                    Some((location, record.name().clone()))
                })
                .collect();
            true
        });
        if restored {
            self.inner.pending.clear();
            info!(
                "event=manager_reset module=manager status=restored components={}",
                self.len()
            );
        }
        stopped
    }

    /// Stops (or resets) and starts again.
    pub fn restart(&self, reset: bool) -> Result<(), LifecycleError> {
        let _guard = self.inner.lock.lock();
        if reset {
            self.reset()?;
        } else {
            self.stop()?;
        }
        self.start();
        Ok(())
    }

    /// Bounded stop, then drops the stash and the snapshot.
    pub fn shutdown(&self) -> Result<bool, LifecycleError> {
        let stopped = self.stop_within(self.inner.config.stop_timeout());
        let _guard = self.inner.lock.lock();
        let discarded = std::mem::take(&mut *self.inner.stash.lock());
        if !discarded.is_empty() {
            warn!("event=manager_shutdown module=manager status=stash_discarded");
        }
        self.with_state(|state| {
            state.snapshot = None;
            state.changed = false;
        });
        info!("event=manager_shutdown module=manager status=ok");
        stopped
    }

    /// Applies the stash with a full stop (or reset) and start.
    ///
    /// Returns false when the stash was empty.
    pub fn refresh(&self, reset: bool) -> Result<bool, LifecycleError> {
        let _guard = self.inner.lock.lock();
        if self.is_stash_empty() {
            return Ok(false);
        }
        let was_running = if reset { self.reset()? } else { self.stop()? };
        let stash = std::mem::take(&mut *self.inner.stash.lock());
        self.apply_stash(stash);
        if was_running {
            self.start();
        }
        Ok(true)
    }

    /// Applies the stash now. While running, only the removed components
    /// and their dependents are cycled.
    pub fn unstash(&self) -> Result<(), LifecycleError> {
        let _guard = self.inner.lock.lock();
        let stash = std::mem::take(&mut *self.inner.stash.lock());
        if stash.is_empty() {
            return Ok(());
        }
        if self.is_running() {
            self.apply_stash_when_running(stash)
        } else {
            self.apply_stash(stash);
            Ok(())
        }
    }

    /// Applies the stash with the configured `ReloadStrategy`.
    pub fn reload(&self) -> Result<(), LifecycleError> {
        self.reload_with(self.inner.config.reload_strategy)
    }

    pub fn reload_with(&self, strategy: ReloadStrategy) -> Result<(), LifecycleError> {
        let _guard = self.inner.lock.lock();
        debug!(
            "event=manager_reload module=manager status=begin strategy={}",
            strategy.as_str()
        );
        match strategy {
            ReloadStrategy::Unstash => self.unstash(),
            ReloadStrategy::Standby if self.is_started() => {
                let stopped = self.standby().map(|_| ());
                let applied = self.unstash();
                self.resume();
                first_error(stopped, applied)
            }
            ReloadStrategy::Standby => self.unstash(),
            ReloadStrategy::Restart => self.refresh(false).map(|_| ()),
        }
    }

    // ---- sweeps ---------------------------------------------------------

    fn activate_components(&self) -> Vec<Arc<RegistrationInfo>> {
        let candidates: Vec<_> = self
            .resolved_registrations()
            .into_iter()
            .filter(|record| record.state() == ComponentState::Resolved)
            .filter(|record| self.instantiate_component(record))
            .collect();

        self.notify_listeners(false, |listener| listener.before_activation(self));
        let activated = candidates
            .into_iter()
            .filter(|record| self.activate_component(record))
            .collect();
        self.notify_listeners(false, |listener| listener.after_activation(self));
        activated
    }

    fn deactivate_components(&self, is_shutdown: bool) {
        self.notify_listeners(true, |listener| listener.before_deactivation(self));
        for record in self.resolved_registrations().iter().rev() {
            if record.is_live() {
                self.deactivate_component(record, is_shutdown);
            }
        }
        if is_shutdown {
            self.inner.pending.clear();
            self.with_state(|state| state.applied.clear());
        }
        self.notify_listeners(true, |listener| listener.after_deactivation(self));
    }

    fn start_components(&self, records: Vec<Arc<RegistrationInfo>>, is_resume: bool) {
        self.notify_listeners(false, |listener| listener.before_start(self, is_resume));
        for record in &records {
            self.start_component(record);
        }
        self.with_state(|state| state.started = Some(records));
        self.notify_listeners(false, |listener| listener.after_start(self, is_resume));
    }

    fn stop_components(&self, is_standby: bool) -> Result<(), LifecycleError> {
        self.notify_listeners(true, |listener| listener.before_stop(self, is_standby));
        let started = self
            .with_state(|state| state.started.clone())
            .unwrap_or_default();
        for record in started.iter().rev() {
            self.stop_component(record)?;
        }
        self.notify_listeners(true, |listener| listener.after_stop(self, is_standby));
        Ok(())
    }

    /// Stops and deactivates `record` and its live dependents, deepest
    /// dependents first, dropping them from the started/standby lists.
    pub(super) fn teardown(&self, record: &Arc<RegistrationInfo>) -> Result<(), LifecycleError> {
        let mut affected = vec![Arc::clone(record)];
        affected.extend(self.with_state(|state| state.registry.dependents(record.name())));

        let mut stopped = Ok(());
        for current in affected.iter().rev() {
            if !current.is_live() {
                continue;
            }
            self.with_state(|state| {
                for list in [state.started.as_mut(), state.standby.as_mut()]
                    .into_iter()
                    .flatten()
                {
                    list.retain(|candidate| !Arc::ptr_eq(candidate, current));
                }
            });
            stopped = first_error(stopped, self.stop_component(current));
            self.deactivate_component(current, false);
        }
        stopped
    }

    fn apply_stash(&self, stash: Stash) {
        self.with_state(|state| state.flushing_stash = true);
        let (removals, additions) = stash.into_parts();
        info!(
            "event=stash_apply module=manager status=begin removals={} additions={}",
            removals.len(),
            additions.len()
        );
        for name in &removals {
            self.unregister(name);
        }
        for descriptor in additions {
            self.register(descriptor);
        }
        self.with_state(|state| state.flushing_stash = false);
    }

    fn apply_stash_when_running(&self, stash: Stash) -> Result<(), LifecycleError> {
        // Records already resolved but idle failed to activate earlier and
        // are left alone; only what this stash resolves gets activated.
        let idle: Vec<_> = self
            .resolved_registrations()
            .into_iter()
            .filter(|record| record.state() == ComponentState::Resolved)
            .collect();
        let removals: Vec<_> = self.with_state(|state| {
            stash
                .to_remove()
                .filter_map(|name| state.registry.get_component(name))
                .collect()
        });
        let mut stopped = Ok(());
        for record in &removals {
            stopped = first_error(stopped, self.teardown(record));
        }

        self.apply_stash(stash);

        let mut activated: Vec<_> = self
            .resolved_registrations()
            .into_iter()
            .filter(|record| record.state() == ComponentState::Resolved)
            .filter(|record| !idle.iter().any(|known| Arc::ptr_eq(known, record)))
            .filter(|record| self.activate_component(record))
            .collect();
        if self.is_standby() {
            let fresh = activated.clone();
            self.with_state(|state| {
                if let Some(list) = state.standby.as_mut() {
                    list.extend(fresh);
                }
            });
        }
        if self.is_started() {
            sort_for_start(&mut activated);
            for record in &activated {
                self.start_component(record);
            }
            self.with_state(|state| {
                if let Some(list) = state.started.as_mut() {
                    list.extend(activated);
                }
            });
        }
        stopped
    }

    // ---- single component transitions ----------------------------------

    fn instantiate_component(&self, record: &Arc<RegistrationInfo>) -> bool {
        if record.instance().is_some() {
            return true;
        }
        let name = record.name();
        let factory = match &record.descriptor().implementation {
            Some(Implementation::Factory(factory)) => Some(Arc::clone(factory)),
            Some(Implementation::Named(reference)) => {
                let found = self.inner.implementations.read().get(reference).cloned();
                if found.is_none() {
                    self.handle_error(
                        format!("component {name} references unknown implementation `{reference}`"),
                        MessageSource::Component,
                        name,
                    );
                    return false;
                }
                found
            }
            None => None,
        };

        match ComponentInstance::build(
            Arc::clone(record.descriptor()),
            factory,
            Arc::downgrade(&self.inner),
        ) {
            Ok(instance) => {
                record.set_instance(instance);
                true
            }
            Err(err) => {
                self.handle_error(
                    format!("failed to instantiate component {name}: {err}"),
                    MessageSource::Component,
                    name,
                );
                false
            }
        }
    }

    pub(super) fn activate_component(&self, record: &Arc<RegistrationInfo>) -> bool {
        if record.state() != ComponentState::Resolved || !self.instantiate_component(record) {
            return false;
        }
        let Some(instance) = record.instance() else {
            return false;
        };
        let name = record.name().clone();

        record.set_state(ComponentState::Activating);
        self.ensure_registries(&name, &record.descriptor().extension_points);

        if let Err(err) = instance.activate() {
            self.handle_error(
                format!("failed to activate component {name}: {err}"),
                MessageSource::Component,
                &name,
            );
            self.with_state(|state| state.registries.reset(&name));
            record.take_instance();
            record.set_state(ComponentState::Resolved);
            return false;
        }
        record.set_state(ComponentState::Activated);

        for extension in record.extensions() {
            self.deliver_extension(Arc::clone(extension));
        }
        let queued: Vec<_> = record
            .descriptor()
            .all_names()
            .flat_map(|alias| self.inner.pending.drain(alias))
            .collect();
        if !queued.is_empty() {
            debug!(
                "event=component_activate module=manager status=draining component={} pending={}",
                name,
                queued.len()
            );
        }
        for extension in queued {
            self.apply_extension(record, &instance, extension);
        }

        self.with_state(|state| {
            for service in record.provided_services() {
                state.services.insert(service.clone(), name.clone());
            }
        });
        debug!(
            "event=component_activate module=manager status=ok component={}",
            name
        );
        self.emit(ComponentEvent::component(
            ComponentEventKind::ComponentActivated,
            name,
        ));
        true
    }

    fn deactivate_component(&self, record: &Arc<RegistrationInfo>, is_shutdown: bool) {
        if !matches!(
            record.state(),
            ComponentState::Activated | ComponentState::StartFailure
        ) {
            return;
        }
        let name = record.name().clone();
        let instance = record.instance();

        record.set_state(ComponentState::Deactivating);
        let applied = self.with_state(|state| {
            state.registries.reset(&name);
            state.services.retain(|_, provider| *provider != name);
            state.applied.remove(&name).unwrap_or_default()
        });

        if !is_shutdown {
            for extension in record.extensions() {
                self.unregister_extension(extension);
            }
            // Contributions from other components wait for the next activation.
            for extension in applied {
                if extension.origin() != &name {
                    self.inner.pending.enqueue(&name, extension);
                }
            }
        }

        if let Some(instance) = instance {
            if let Err(err) = instance.deactivate() {
                self.handle_error(
                    format!("failed to deactivate component {name}: {err}"),
                    MessageSource::Component,
                    &name,
                );
            }
        }
        record.take_instance();
        record.set_state(ComponentState::Resolved);
        debug!(
            "event=component_deactivate module=manager status=ok component={}",
            name
        );
        self.emit(ComponentEvent::component(
            ComponentEventKind::ComponentDeactivated,
            name,
        ));
    }

    fn start_component(&self, record: &Arc<RegistrationInfo>) {
        let name = record.name().clone();
        self.with_state(|state| state.registries.initialize(&name));
        if record.state() != ComponentState::Activated {
            return;
        }
        let Some(instance) = record.instance() else {
            return;
        };

        record.set_state(ComponentState::Starting);
        match instance.start() {
            Ok(()) => {
                record.set_state(ComponentState::Started);
                debug!(
                    "event=component_start module=manager status=ok component={}",
                    name
                );
                self.emit(ComponentEvent::component(
                    ComponentEventKind::ComponentStarted,
                    name,
                ));
            }
            Err(err) => {
                record.set_state(ComponentState::StartFailure);
                self.handle_error(
                    format!("failed to start component {name}: {err}"),
                    MessageSource::Component,
                    &name,
                );
            }
        }
    }

    fn stop_component(&self, record: &Arc<RegistrationInfo>) -> Result<(), LifecycleError> {
        if record.state() != ComponentState::Started {
            return Ok(());
        }
        let Some(instance) = record.instance() else {
            return Ok(());
        };
        let name = record.name().clone();

        record.set_state(ComponentState::Stopping);
        let stopped = instance.stop();
        record.set_state(ComponentState::Activated);
        match stopped {
            Ok(()) => {
                debug!(
                    "event=component_stop module=manager status=ok component={}",
                    name
                );
                self.emit(ComponentEvent::component(
                    ComponentEventKind::ComponentStopped,
                    name,
                ));
                Ok(())
            }
            Err(source) => {
                error!(
                    "event=component_stop module=manager status=error component={} error={}",
                    name, source
                );
                Err(LifecycleError::StopFailed {
                    component: name,
                    source,
                })
            }
        }
    }
}
