//! CLI smoke entry point.
//!
//! # Responsibility
//! - Boot a small demo component graph against `lattice_core` and print the
//!   resulting lifecycle states.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `lattice_cli [config.json]`

use lattice_core::{
    core_version, init_from_config, Component, ComponentContext, ComponentDescriptor,
    ComponentError, ComponentManager, ComponentName, ExtensionPointDecl, RuntimeConfig,
};
use log::info;
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;

struct Probe;

impl Component for Probe {
    fn start(&self, context: &ComponentContext) -> Result<(), ComponentError> {
        info!(
            "event=probe_start module=cli status=ok component={}",
            context.name()
        );
        Ok(())
    }
}

fn demo_components() -> Result<Vec<ComponentDescriptor>, String> {
    let probe: Arc<dyn Component> = Arc::new(Probe);
    let descriptors = vec![
        ComponentDescriptor::builder("demo.web")
            .requires("demo.store")
            .extension("demo.store", "schemas", vec![json!({"id": "page"})])
            .start_order(10)
            .instance(Arc::clone(&probe))
            .build(),
        ComponentDescriptor::builder("demo.store")
            .extension_point(ExtensionPointDecl::new("schemas").with_contribution_kind("map"))
            .provides("storage")
            .instance(Arc::clone(&probe))
            .build(),
        ComponentDescriptor::builder("demo.audit")
            .requires("demo.missing")
            .build(),
    ];
    descriptors
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.to_string())
}

fn run() -> Result<(), String> {
    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(&path).map_err(|err| err.to_string())?,
        None => RuntimeConfig::default(),
    };
    init_from_config(&config).map_err(|err| err.to_string())?;

    println!("lattice_core version={}", core_version());
    let manager = ComponentManager::with_config(config);
    for descriptor in demo_components()? {
        let name = descriptor.name.clone();
        println!("register {name}: {:?}", manager.register(descriptor));
    }

    manager.start();
    for record in manager.registrations() {
        println!("{} state={}", record.name(), record.state().as_str());
    }
    let store = ComponentName::parse("demo.store").map_err(|err| err.to_string())?;
    if let Some(contributions) = manager.map_contributions(&store, "schemas") {
        println!("demo.store schemas={}", contributions.len());
    }
    println!("needed={:?}", manager.needed_registrations());

    manager.shutdown().map_err(|err| err.to_string())?;
    println!("stopped started={}", manager.is_started());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("lattice_cli: {message}");
            ExitCode::FAILURE
        }
    }
}
