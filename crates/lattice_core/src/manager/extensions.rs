//! Extension delivery: live targets get contributions now, everything else
//! waits in the pending queue until the target activates.

use super::ComponentManager;
use crate::component::instance::{ComponentInstance, ExtensionRoute};
use crate::component::registration::RegistrationInfo;
use crate::diagnostics::MessageSource;
use crate::events::{ComponentEvent, ComponentEventKind};
use crate::extension::{Extension, ExtensionId};
use crate::model::descriptor::ExtensionPointDecl;
use crate::model::name::ComponentName;
use log::debug;
use std::sync::Arc;

impl ComponentManager {
    /// Contributes `extension` to its target, or queues it until the target
    /// is activated.
    pub fn register_extension(&self, extension: Extension) -> ExtensionId {
        let id = extension.id();
        self.deliver_extension(Arc::new(extension));
        id
    }

    /// Withdraws a previously registered extension, live or queued.
    pub fn unregister_extension(&self, extension: &Extension) -> bool {
        let _guard = self.inner.lock.lock();
        let target = self.with_state(|state| state.registry.get_component(extension.target()));
        if let Some(record) = target.as_ref().filter(|record| record.is_live()) {
            if let Some(instance) = record.instance() {
                return self.withdraw_applied(record, &instance, extension);
            }
        }

        let mut removed = self.inner.pending.remove(extension.target(), extension);
        if let Some(record) = &target {
            removed |= self.inner.pending.remove(record.name(), extension);
        }
        if removed {
            debug!(
                "event=extension_unregister module=manager status=dequeued extension={}",
                extension
            );
            self.emit(ComponentEvent::extension(
                ComponentEventKind::ExtensionUnregistered,
                Arc::new(extension.clone()),
            ));
        }
        removed
    }

    pub(super) fn deliver_extension(&self, extension: Arc<Extension>) {
        let _guard = self.inner.lock.lock();
        let target = self.with_state(|state| state.registry.get_component(extension.target()));
        if let Some(record) = target.as_ref().filter(|record| record.is_live()) {
            if let Some(instance) = record.instance() {
                self.apply_extension(record, &instance, extension);
                return;
            }
        }

        let key = target
            .as_ref()
            .map_or_else(|| extension.target().clone(), |record| record.name().clone());
        if self.inner.pending.enqueue(&key, Arc::clone(&extension)) {
            debug!(
                "event=extension_register module=manager status=pending target={} extension={}",
                key, extension
            );
            self.emit(ComponentEvent::extension(
                ComponentEventKind::ExtensionPending,
                extension,
            ));
        }
    }

    /// Applies `extension` to a live `target`.
    pub(super) fn apply_extension(
        &self,
        target: &Arc<RegistrationInfo>,
        instance: &Arc<ComponentInstance>,
        extension: Arc<Extension>,
    ) {
        let point = match instance.route(&extension) {
            ExtensionRoute::Local(point) => point,
            ExtensionRoute::Delegated(forwarded) => {
                debug!(
                    "event=extension_register module=manager status=delegated from={} to={}",
                    extension,
                    forwarded
                );
                self.deliver_extension(Arc::new(forwarded));
                return;
            }
            ExtensionRoute::UnknownPoint => {
                self.handle_error(
                    format!(
                        "component {} has no extension point `{}` (contributed by {})",
                        target.name(),
                        extension.point(),
                        extension.origin()
                    ),
                    MessageSource::Extension,
                    extension.origin(),
                );
                return;
            }
        };

        let target_name = target.name().clone();
        self.ensure_registries(&target_name, std::slice::from_ref(point));
        let contributed = self.with_state(|state| {
            let contributed = match state.registries.get_mut(&target_name, &point.name) {
                Some(registry) if !registry.is_tagged(extension.tag()) => {
                    registry.tag(extension.tag());
                    registry.register(extension.tag(), extension.contributions())
                }
                _ => Ok(()),
            };
            state
                .applied
                .entry(target_name.clone())
                .or_default()
                .insert(Arc::clone(&extension));
            contributed
        });
        if let Err(err) = contributed {
            self.handle_error(
                format!("failed to register extension {extension}: {err}"),
                MessageSource::Extension,
                extension.origin(),
            );
        }
        if let Err(err) = instance.register_extension(&extension) {
            self.handle_error(
                format!("component {target_name} rejected extension {extension}: {err}"),
                MessageSource::Extension,
                extension.origin(),
            );
        }

        debug!(
            "event=extension_register module=manager status=ok extension={}",
            extension
        );
        self.emit(ComponentEvent::extension(
            ComponentEventKind::ExtensionRegistered,
            extension,
        ));
    }

    /// Builds the missing registries of `points` for `component`.
    ///
    /// Factories run with no state borrow held, so they may call back into
    /// the manager.
    pub(super) fn ensure_registries(&self, component: &ComponentName, points: &[ExtensionPointDecl]) {
        for point in points {
            let factory = {
                let catalog = self.inner.registry_kinds.read();
                self.with_state(|state| state.registries.missing_factory(component, point, &catalog))
            };
            if let Some(factory) = factory {
                let registry = factory();
                self.with_state(|state| state.registries.insert(component, &point.name, registry));
            }
        }
    }

    fn withdraw_applied(
        &self,
        target: &Arc<RegistrationInfo>,
        instance: &Arc<ComponentInstance>,
        extension: &Extension,
    ) -> bool {
        match instance.route(extension) {
            ExtensionRoute::Local(_) => {}
            ExtensionRoute::Delegated(forwarded) => return self.unregister_extension(&forwarded),
            ExtensionRoute::UnknownPoint => return false,
        }

        let target_name = target.name().clone();
        let (removed, withdrawn) = self.with_state(|state| {
            let removed = state
                .applied
                .get_mut(&target_name)
                .is_some_and(|applied| applied.shift_remove(extension));
            let withdrawn = match state.registries.get_mut(&target_name, extension.point()) {
                Some(registry) if removed => registry.unregister(extension.tag()),
                _ => Ok(()),
            };
            (removed, withdrawn)
        });
        if !removed {
            return false;
        }
        if let Err(err) = withdrawn {
            self.handle_error(
                format!("failed to unregister extension {extension}: {err}"),
                MessageSource::Extension,
                extension.origin(),
            );
        }
        if let Err(err) = instance.unregister_extension(extension) {
            self.handle_error(
                format!("component {target_name} failed to release extension {extension}: {err}"),
                MessageSource::Extension,
                extension.origin(),
            );
        }

        debug!(
            "event=extension_unregister module=manager status=ok extension={}",
            extension
        );
        self.emit(ComponentEvent::extension(
            ComponentEventKind::ExtensionUnregistered,
            Arc::new(extension.clone()),
        ));
        true
    }
}
