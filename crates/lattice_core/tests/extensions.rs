mod support;

use lattice_core::{
    ComponentDescriptor, ContributionRegistry, Extension, ExtensionPointDecl, MapRegistry,
    MessageSource,
};
use serde_json::json;
use support::{build, manager, name, recorded, Journal};

fn items_point() -> ExtensionPointDecl {
    ExtensionPointDecl::new("items").with_contribution_kind("map")
}

#[test]
fn queued_extensions_apply_in_arrival_order() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(ComponentDescriptor::builder("first").extension(
        "catalog",
        "items",
        vec![json!({"id": "x", "rev": 1}), json!({"id": "y"})],
    )));
    manager.register(build(ComponentDescriptor::builder("second").extension(
        "catalog",
        "items",
        vec![json!({"id": "x", "rev": 2})],
    )));
    manager.register(build(recorded("catalog", &journal).extension_point(items_point())));

    manager.start();
    assert_eq!(
        journal.of("extension"),
        vec!["catalog:extension:first", "catalog:extension:second"]
    );
    let contributions = manager
        .map_contributions(&name("catalog"), "items")
        .expect("map registry");
    assert_eq!(
        contributions,
        vec![
            ("x".to_string(), json!({"id": "x", "rev": 2})),
            ("y".to_string(), json!({"id": "y"})),
        ]
    );
    assert!(manager.pending_extensions_for(&name("catalog")).is_empty());
}

#[test]
fn extensions_for_unknown_targets_wait_until_registration() {
    let journal = Journal::default();
    let (manager, _) = manager();
    let extension = Extension::new(
        name("tool"),
        name("catalog"),
        "items",
        vec![json!({"id": "late"})],
    );
    manager.register_extension(extension.clone());
    assert_eq!(manager.pending_extensions_for(&name("catalog")).len(), 1);
    assert_eq!(
        manager
            .missing_registrations()
            .get(&name("tool"))
            .map(Vec::len),
        Some(1)
    );

    manager.register(build(recorded("catalog", &journal).extension_point(items_point())));
    manager.start();
    assert_eq!(journal.of("extension"), vec!["catalog:extension:tool"]);
    assert!(manager.missing_registrations().is_empty());
}

#[test]
fn alias_and_primary_name_share_one_queue() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register_extension(Extension::new(
        name("tool"),
        name("legacy-catalog"),
        "items",
        vec![json!({"id": "from-alias"})],
    ));
    manager.register(build(
        recorded("catalog", &journal)
            .alias("legacy-catalog")
            .extension_point(items_point()),
    ));
    manager.register_extension(Extension::new(
        name("tool"),
        name("legacy-catalog"),
        "items",
        vec![json!({"id": "after-registration"})],
    ));
    assert_eq!(manager.pending_extensions_for(&name("catalog")).len(), 1);
    assert_eq!(manager.pending_extensions_for(&name("legacy-catalog")).len(), 1);

    manager.start();
    let ids: Vec<String> = manager
        .map_contributions(&name("legacy-catalog"), "items")
        .expect("resolved through alias")
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["after-registration", "from-alias"]);
}

#[test]
fn live_target_applies_and_withdraws_immediately() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("catalog", &journal).extension_point(items_point())));
    manager.start();

    let extension = Extension::new(
        name("tool"),
        name("catalog"),
        "items",
        vec![json!({"id": "hot"})],
    );
    manager.register_extension(extension.clone());
    assert_eq!(
        manager
            .map_contributions(&name("catalog"), "items")
            .map(|contributions| contributions.len()),
        Some(1)
    );

    assert!(manager.unregister_extension(&extension));
    assert!(!manager.unregister_extension(&extension));
    assert_eq!(
        manager
            .map_contributions(&name("catalog"), "items")
            .map(|contributions| contributions.len()),
        Some(0)
    );
    let entries = journal.entries();
    assert_eq!(
        &entries[entries.len() - 2..],
        ["catalog:extension:tool", "catalog:unextension:tool"]
    );
}

#[test]
fn undeclared_point_is_reported_once_and_skipped() {
    let journal = Journal::default();
    let (manager, collector) = manager();
    manager.register(build(ComponentDescriptor::builder("tool").extension(
        "catalog",
        "nope",
        vec![json!({"id": "lost"})],
    )));
    manager.register(build(recorded("catalog", &journal).extension_point(items_point())));

    manager.start();
    let errors = collector.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source, MessageSource::Extension);
    assert_eq!(errors[0].source_id, "service:tool");
    assert!(journal.of("extension").is_empty());
    assert!(manager.is_started());
}

#[test]
fn delegated_points_forward_to_the_delegate() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(ComponentDescriptor::builder("tool").extension(
        "facade",
        "items",
        vec![json!({"id": "forwarded"})],
    )));
    manager.register(build(
        recorded("facade", &journal)
            .extension_point(ExtensionPointDecl::new("items").delegate_to(name("store"), None)),
    ));
    assert_eq!(manager.state_of(&name("facade")), Some(lattice_core::ComponentState::Pending));
    manager.register(build(recorded("store", &journal).extension_point(items_point())));

    manager.start();
    assert_eq!(journal.of("extension"), vec!["store:extension:tool"]);
    let ids: Vec<String> = manager
        .map_contributions(&name("store"), "items")
        .expect("store registry")
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["forwarded"]);
}

#[test]
fn redeployed_target_gets_contributions_back() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(ComponentDescriptor::builder("tool").extension(
        "catalog",
        "items",
        vec![json!({"id": "kept"})],
    )));
    let catalog = || build(recorded("catalog", &journal).extension_point(items_point()));
    manager.register(catalog());
    manager.start();

    manager.unregister(&name("catalog"));
    manager.unstash().expect("removal applied");
    assert!(manager.state_of(&name("catalog")).is_none());
    assert_eq!(manager.pending_extensions_for(&name("catalog")).len(), 1);

    manager.register(catalog());
    manager.unstash().expect("addition applied");
    assert_eq!(
        manager.state_of(&name("catalog")),
        Some(lattice_core::ComponentState::Started)
    );
    let ids: Vec<String> = manager
        .map_contributions(&name("catalog"), "items")
        .expect("catalog registry")
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["kept"]);
    assert_eq!(journal.of("extension").len(), 2);
}

#[test]
fn contributions_can_be_disabled_and_enabled() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(ComponentDescriptor::builder("tool").extension(
        "catalog",
        "items",
        vec![json!({"id": "a"}), json!({"id": "b"})],
    )));
    manager.register(build(recorded("catalog", &journal).extension_point(items_point())));
    assert!(!manager.set_contribution_enabled(&name("catalog"), "items", "a", false));

    manager.start();
    assert!(manager.set_contribution_enabled(&name("catalog"), "items", "a", false));
    let ids = |manager: &lattice_core::ComponentManager| -> Vec<String> {
        manager
            .map_contributions(&name("catalog"), "items")
            .expect("catalog registry")
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    };
    assert_eq!(ids(&manager), vec!["b"]);

    manager.set_contribution_enabled(&name("catalog"), "items", "a", true);
    assert_eq!(ids(&manager), vec!["a", "b"]);
}

#[test]
fn unregistering_the_origin_withdraws_runtime_contributions() {
    let journal = Journal::default();
    let (manager, _) = manager();
    manager.register(build(recorded("catalog", &journal).extension_point(items_point())));
    manager.register(build(recorded("tool", &journal)));
    manager.start();

    manager.register_extension(Extension::new(
        name("tool"),
        name("catalog"),
        "items",
        vec![json!({"id": "t"})],
    ));
    assert_eq!(
        manager
            .map_contributions(&name("catalog"), "items")
            .map(|contributions| contributions.len()),
        Some(1)
    );

    manager.unregister(&name("tool"));
    manager.unstash().expect("removal applied");
    assert!(manager.state_of(&name("tool")).is_none());
    assert_eq!(
        manager.map_contributions(&name("catalog"), "items"),
        Some(Vec::new())
    );
    assert_eq!(journal.of("unextension"), vec!["catalog:unextension:tool"]);
}

#[test]
fn registry_factories_may_call_back_into_the_manager() {
    let journal = Journal::default();
    let (manager, _) = manager();
    let observer = manager.clone();
    let calls = Journal::default();
    let seen = calls.clone();
    manager.register_registry_kind("observed", move || {
        seen.push(format!("factory:{}", observer.len()));
        Box::new(MapRegistry::new()) as Box<dyn ContributionRegistry>
    });
    manager.register(build(ComponentDescriptor::builder("tool").extension(
        "catalog",
        "items",
        vec![json!({"id": "built"})],
    )));
    manager.register(build(
        recorded("catalog", &journal)
            .extension_point(ExtensionPointDecl::new("items").with_contribution_kind("observed")),
    ));

    manager.start();
    assert_eq!(calls.entries(), vec!["factory:2"]);
    assert_eq!(
        manager.map_contributions(&name("catalog"), "items"),
        Some(vec![("built".to_string(), json!({"id": "built"}))])
    );
}
