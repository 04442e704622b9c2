//! Extensions contributed between components.
//!
//! This module defines the immutable extension object, the queue holding
//! extensions whose target is not active yet, and the per-extension-point
//! contribution registries owned by the manager.

pub mod pending;
pub mod points;
pub mod registry;

use crate::model::descriptor::ExtensionDecl;
use crate::model::name::ComponentName;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Stable identity of one extension object.
pub type ExtensionId = Uuid;

/// One contribution from `origin` to `target`'s extension point `point`.
///
/// Equality and hashing use the identity only: two extensions carrying the
/// same payload are still distinct queue entries.
#[derive(Debug, Clone)]
pub struct Extension {
    id: ExtensionId,
    tag: String,
    origin: ComponentName,
    target: ComponentName,
    point: String,
    contributions: Arc<[Value]>,
}

impl Extension {
    /// Creates a runtime extension with a generated identity tag.
    pub fn new(
        origin: ComponentName,
        target: ComponentName,
        point: impl Into<String>,
        contributions: Vec<Value>,
    ) -> Self {
        let id = Uuid::new_v4();
        let point = point.into();
        Self {
            tag: format!("{origin}#{point}.{}", id.simple()),
            id,
            origin,
            target,
            point,
            contributions: contributions.into(),
        }
    }

    /// Builds the extension for the `index`-th declaration of `origin`.
    pub(crate) fn declared(origin: &ComponentName, index: usize, decl: &ExtensionDecl) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: format!("{origin}#{}.{index}", decl.point),
            origin: origin.clone(),
            target: decl.target.clone(),
            point: decl.point.clone(),
            contributions: decl.contributions.clone().into(),
        }
    }

    /// Same extension aimed at another component/point; identity and tag are kept.
    pub fn retarget(&self, target: ComponentName, point: impl Into<String>) -> Self {
        Self {
            id: self.id,
            tag: self.tag.clone(),
            origin: self.origin.clone(),
            target,
            point: point.into(),
            contributions: Arc::clone(&self.contributions),
        }
    }

    pub fn id(&self) -> ExtensionId {
        self.id
    }

    /// Identity tag used by per-point registries for idempotent redeployment.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn origin(&self) -> &ComponentName {
        &self.origin
    }

    pub fn target(&self) -> &ComponentName {
        &self.target
    }

    pub fn point(&self) -> &str {
        &self.point
    }

    pub fn contributions(&self) -> &[Value] {
        &self.contributions
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Extension {}

impl Hash for Extension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}:{} ({})",
            self.origin, self.target, self.point, self.tag
        )
    }
}
