mod support;

use lattice_core::{
    ComponentEvent, ComponentEventKind, ComponentListener, ComponentState, LifecycleError,
    RegistrationOutcome,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use support::{build, manager, name, recorded, Journal, PhaseListener, Recorder};

#[test]
fn start_follows_start_order_and_stop_reverses_it() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("a", &journal).start_order(10)));
    manager.register(build(recorded("b", &journal)));
    manager.register(build(recorded("c", &journal).requires("a")));

    assert!(manager.start());
    assert_eq!(journal.of("activate"), vec!["a:activate", "b:activate", "c:activate"]);
    assert_eq!(journal.of("start"), vec!["b:start", "c:start", "a:start"]);
    for raw in ["a", "b", "c"] {
        assert_eq!(manager.state_of(&name(raw)), Some(ComponentState::Started));
    }

    assert!(manager.stop().expect("clean stop"));
    assert_eq!(journal.of("stop"), vec!["a:stop", "c:stop", "b:stop"]);
    assert_eq!(
        journal.of("deactivate"),
        vec!["c:deactivate", "b:deactivate", "a:deactivate"]
    );
    for raw in ["a", "b", "c"] {
        assert_eq!(manager.state_of(&name(raw)), Some(ComponentState::Resolved));
    }
}

#[test]
fn start_and_stop_are_idempotent() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("a", &journal)));

    assert!(!manager.stop().expect("idle stop"));
    assert!(manager.start());
    assert!(!manager.start());
    assert!(manager.stop().expect("stop"));
    assert!(!manager.stop().expect("second stop"));
    assert_eq!(journal.of("start").len(), 1);
    assert_eq!(journal.of("stop").len(), 1);
}

#[test]
fn pending_component_waits_for_its_dependency() {
    let journal = Journal::default();
    let (manager, _) = manager();

    let outcome = manager.register(build(recorded("web", &journal).requires("store")));
    assert_eq!(
        outcome,
        RegistrationOutcome::Pending(BTreeSet::from([name("store")]))
    );
    assert_eq!(manager.state_of(&name("web")), Some(ComponentState::Pending));
    assert_eq!(manager.needed_registrations(), BTreeSet::from([name("store")]));

    manager.start();
    assert!(journal.entries().is_empty());
    manager.stop().expect("stop");

    assert_eq!(
        manager.register(build(recorded("store", &journal))),
        RegistrationOutcome::Registered
    );
    assert_eq!(manager.state_of(&name("web")), Some(ComponentState::Resolved));
    assert!(manager.pending_registrations().is_empty());
    assert!(manager.needed_registrations().is_empty());
}

#[test]
fn failing_start_is_isolated_to_one_component() {
    let journal = Journal::default();
    let (manager, collector) = manager();
    manager.register(build(recorded("a", &journal)));
    manager.register(build(
        lattice_core::ComponentDescriptor::builder("b")
            .instance(Recorder::new(&journal).failing_on("start").shared()),
    ));
    manager.register(build(recorded("c", &journal)));

    assert!(manager.start());
    assert_eq!(manager.state_of(&name("a")), Some(ComponentState::Started));
    assert_eq!(manager.state_of(&name("b")), Some(ComponentState::StartFailure));
    assert_eq!(manager.state_of(&name("c")), Some(ComponentState::Started));
    assert_eq!(manager.start_failure_registrations(), vec![name("b")]);
    assert_eq!(collector.errors().len(), 1);
    assert_eq!(collector.messages_for("service:b").len(), 1);

    manager.stop().expect("stop");
    assert!(!journal.of("stop").contains(&"b:stop".to_string()));
    assert!(journal.of("deactivate").contains(&"b:deactivate".to_string()));
    assert_eq!(manager.state_of(&name("b")), Some(ComponentState::Resolved));
}

#[test]
fn failing_activation_leaves_component_resolved() {
    let journal = Journal::default();
    let (manager, collector) = manager();
    manager.register(build(
        lattice_core::ComponentDescriptor::builder("broken")
            .instance(Recorder::new(&journal).failing_on("activate").shared()),
    ));
    manager.register(build(recorded("healthy", &journal)));

    manager.start();
    assert_eq!(manager.state_of(&name("broken")), Some(ComponentState::Resolved));
    assert!(manager
        .registration(&name("broken"))
        .expect("registered")
        .instance()
        .is_none());
    assert_eq!(manager.state_of(&name("healthy")), Some(ComponentState::Started));
    assert!(!journal.entries().contains(&"broken:start".to_string()));

    let errors = collector.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source_id, "service:broken");

    manager.stop().expect("stop");
    assert!(!journal.entries().contains(&"broken:deactivate".to_string()));
}

#[test]
fn panicking_hook_is_contained() {
    let journal = Journal::default();
    let (manager, collector) = manager();
    manager.register(build(
        lattice_core::ComponentDescriptor::builder("volatile")
            .instance(Recorder::new(&journal).panicking_on("activate").shared()),
    ));
    manager.register(build(recorded("steady", &journal)));

    assert!(manager.start());
    assert_eq!(manager.state_of(&name("volatile")), Some(ComponentState::Resolved));
    assert_eq!(manager.state_of(&name("steady")), Some(ComponentState::Started));
    let errors = collector.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text.contains("activate exploded"));
}

#[test]
fn stop_failure_aborts_the_sweep_without_deactivating() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("a", &journal)));
    manager.register(build(
        lattice_core::ComponentDescriptor::builder("b")
            .instance(Recorder::new(&journal).failing_on("stop").shared()),
    ));
    manager.register(build(recorded("c", &journal)));
    manager.start();

    let err = manager.stop().expect_err("b refuses to stop");
    match err {
        LifecycleError::StopFailed { component, .. } => assert_eq!(component, name("b")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(journal.of("stop"), vec!["c:stop", "b:stop"]);
    assert!(journal.of("deactivate").is_empty());
    assert!(!manager.is_started());
    assert_eq!(manager.state_of(&name("c")), Some(ComponentState::Activated));
    assert_eq!(manager.state_of(&name("b")), Some(ComponentState::Activated));
    assert_eq!(manager.state_of(&name("a")), Some(ComponentState::Started));
    assert!(!manager.stop().expect("already stopped"));
}

#[test]
fn runtime_listeners_wrap_phases_in_order() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("a", &journal)));
    manager.add_listener(Arc::new(PhaseListener {
        label: "first",
        journal: journal.clone(),
    }));
    manager.add_listener(Arc::new(PhaseListener {
        label: "second",
        journal: journal.clone(),
    }));

    manager.start();
    manager.stop().expect("stop");

    let phases: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|entry| entry.starts_with("first") || entry.starts_with("second"))
        .collect();
    assert_eq!(
        phases,
        vec![
            "first:before_activation",
            "second:before_activation",
            "first:before_start resume=false",
            "second:before_start resume=false",
            "second:before_stop standby=false",
            "first:before_stop standby=false",
            "second:after_deactivation",
            "first:after_deactivation",
        ]
    );
}

struct EventLog(Mutex<Vec<(ComponentEventKind, String)>>);

impl ComponentListener for EventLog {
    fn handle_event(&self, event: &ComponentEvent) {
        self.0
            .lock()
            .push((event.kind, event.component.name().to_string()));
    }
}

#[test]
fn component_events_trace_the_lifecycle() {
    let journal = Journal::default();
    let (manager, _) = manager();
    let log = Arc::new(EventLog(Mutex::new(Vec::new())));
    manager.add_component_listener(log.clone());

    manager.register(build(recorded("a", &journal)));
    manager.start();
    manager.stop().expect("stop");
    manager.unregister(&name("a"));

    let kinds: Vec<ComponentEventKind> = log.0.lock().iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            ComponentEventKind::ComponentRegistered,
            ComponentEventKind::ComponentActivated,
            ComponentEventKind::ComponentStarted,
            ComponentEventKind::ComponentStopped,
            ComponentEventKind::ComponentDeactivated,
            ComponentEventKind::ComponentUnregistered,
        ]
    );
    assert!(log.0.lock().iter().all(|(_, component)| component == "a"));
}

#[test]
fn standby_keeps_components_activated_until_resume() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("a", &journal)));
    manager.register(build(recorded("b", &journal).start_order(-1)));
    manager.start();

    assert!(manager.standby().expect("standby"));
    assert!(!manager.standby().expect("already in standby"));
    assert!(manager.is_standby());
    assert!(manager.is_running());
    assert_eq!(manager.state_of(&name("a")), Some(ComponentState::Activated));

    journal.clear();
    assert!(manager.start());
    assert!(manager.is_started());
    assert!(!manager.is_standby());
    assert_eq!(journal.entries(), vec!["b:start", "a:start"]);

    manager.standby().expect("standby again");
    assert!(manager.stop().expect("stop from standby"));
    assert!(!manager.is_running());
    assert_eq!(manager.state_of(&name("a")), Some(ComponentState::Resolved));
}

#[test]
fn hooks_may_call_back_into_the_manager() {
    struct Introspecting {
        seen: Mutex<Option<ComponentState>>,
    }

    impl lattice_core::Component for Introspecting {
        fn activate(
            &self,
            ctx: &lattice_core::ComponentContext,
        ) -> Result<(), lattice_core::ComponentError> {
            let manager = ctx.manager().expect("manager alive");
            *self.seen.lock() = manager.state_of(ctx.name());
            Ok(())
        }
    }

    let component = Arc::new(Introspecting {
        seen: Mutex::new(None),
    });
    let (manager, _) = manager();
    manager.register(build(
        lattice_core::ComponentDescriptor::builder("introspector").instance(component.clone()),
    ));
    manager.start();

    assert_eq!(*component.seen.lock(), Some(ComponentState::Activating));
}

#[test]
fn bounded_stop_waits_for_slow_components() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(
        lattice_core::ComponentDescriptor::builder("slow").instance(
            Recorder::new(&journal)
                .slow_stop(std::time::Duration::from_millis(50))
                .shared(),
        ),
    ));
    manager.start();

    let stopped = manager
        .stop_within(std::time::Duration::from_millis(5))
        .expect("stop completes after the warning");
    assert!(stopped);
    assert_eq!(journal.of("stop"), vec!["slow:stop"]);
    assert!(!manager.is_started());
}
