#![allow(dead_code)]

use lattice_core::{
    Component, ComponentContext, ComponentDescriptor, ComponentError, ComponentManager,
    ComponentName, DescriptorBuilder, Extension, MessageCollector, RuntimeListener,
};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Shared, ordered log of hook calls: `"<bare name>:<hook>"`.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries whose hook part equals `hook`, e.g. `"start"`.
    pub fn of(&self, hook: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.split(':').nth(1) == Some(hook))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Component recording every hook into a `Journal`.
pub struct Recorder {
    journal: Journal,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
    stop_delay: Option<Duration>,
    service: Option<Arc<dyn Any + Send + Sync>>,
}

impl Recorder {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_on: None,
            panic_on: None,
            stop_delay: None,
            service: None,
        }
    }

    pub fn failing_on(mut self, hook: &'static str) -> Self {
        self.fail_on = Some(hook);
        self
    }

    pub fn panicking_on(mut self, hook: &'static str) -> Self {
        self.panic_on = Some(hook);
        self
    }

    pub fn slow_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn serving(mut self, service: Arc<dyn Any + Send + Sync>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn shared(self) -> Arc<dyn Component> {
        Arc::new(self)
    }

    fn record(&self, ctx: &ComponentContext, hook: &'static str) -> Result<(), ComponentError> {
        self.journal.push(format!("{}:{hook}", ctx.name().name()));
        if self.panic_on == Some(hook) {
            panic!("{hook} exploded");
        }
        if self.fail_on == Some(hook) {
            return Err(ComponentError::new(format!("{hook} refused")));
        }
        Ok(())
    }
}

impl Component for Recorder {
    fn activate(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.record(ctx, "activate")
    }

    fn deactivate(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.record(ctx, "deactivate")
    }

    fn start(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.record(ctx, "start")
    }

    fn stop(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        if let Some(delay) = self.stop_delay {
            std::thread::sleep(delay);
        }
        self.record(ctx, "stop")
    }

    fn register_extension(
        &self,
        ctx: &ComponentContext,
        extension: &Extension,
    ) -> Result<(), ComponentError> {
        self.journal.push(format!(
            "{}:extension:{}",
            ctx.name().name(),
            extension.origin().name()
        ));
        Ok(())
    }

    fn unregister_extension(
        &self,
        ctx: &ComponentContext,
        extension: &Extension,
    ) -> Result<(), ComponentError> {
        self.journal.push(format!(
            "{}:unextension:{}",
            ctx.name().name(),
            extension.origin().name()
        ));
        Ok(())
    }

    fn adapter(&self, _service: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.service.clone()
    }
}

/// Runtime listener journaling phase callbacks as `"<label>:<phase>"`.
pub struct PhaseListener {
    pub label: &'static str,
    pub journal: Journal,
}

impl RuntimeListener for PhaseListener {
    fn before_activation(&self, _manager: &ComponentManager) {
        self.journal.push(format!("{}:before_activation", self.label));
    }

    fn before_start(&self, _manager: &ComponentManager, is_resume: bool) {
        self.journal
            .push(format!("{}:before_start resume={is_resume}", self.label));
    }

    fn before_stop(&self, _manager: &ComponentManager, is_standby: bool) {
        self.journal
            .push(format!("{}:before_stop standby={is_standby}", self.label));
    }

    fn after_deactivation(&self, _manager: &ComponentManager) {
        self.journal.push(format!("{}:after_deactivation", self.label));
    }
}

pub fn name(raw: &str) -> ComponentName {
    ComponentName::parse(raw).expect("valid component name")
}

/// Manager wired to a collector the test can inspect.
pub fn manager() -> (ComponentManager, Arc<MessageCollector>) {
    let collector = Arc::new(MessageCollector::new());
    let manager = ComponentManager::builder()
        .message_handler(collector.clone())
        .build();
    (manager, collector)
}

/// Descriptor builder for `raw` backed by a plain `Recorder`.
pub fn recorded(raw: &str, journal: &Journal) -> DescriptorBuilder {
    ComponentDescriptor::builder(raw).instance(Recorder::new(journal).shared())
}

pub fn build(builder: DescriptorBuilder) -> ComponentDescriptor {
    builder.build().expect("valid descriptor")
}
