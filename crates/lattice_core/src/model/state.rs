//! Component lifecycle state machine.
//!
//! # Responsibility
//! - Define the per-component lifecycle states and their legal transitions.
//! - Provide a lock-free cell so any thread can poll a component's state.
//!
//! # Invariants
//! - Writers go through `AtomicComponentState::transition`, which refuses
//!   edges not present in `ComponentState::can_transition_to`.
//! - `StartFailure` is only entered from `Starting` and only left through
//!   `Deactivating`.

use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ComponentState {
    Unregistered = 0,
    /// Registered but waiting on missing dependencies.
    Pending = 1,
    Resolved = 2,
    Activating = 3,
    Activated = 4,
    Starting = 5,
    Started = 6,
    Stopping = 7,
    Deactivating = 8,
    StartFailure = 9,
}

impl ComponentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Deactivating => "deactivating",
            Self::StartFailure => "start_failure",
        }
    }

    /// Whether the component accepts extensions and serves adapters.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Activated | Self::Starting | Self::Started | Self::StartFailure
        )
    }

    /// Whether dependency resolution succeeded and the record has not been
    /// torn down since.
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Unregistered | Self::Pending)
    }

    pub fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Unregistered, Pending)
                | (Pending, Resolved)
                | (Pending, Unregistered)
                | (Resolved, Activating)
                | (Resolved, Pending)
                | (Resolved, Unregistered)
                | (Activating, Activated)
                | (Activating, Resolved)
                | (Activated, Starting)
                | (Activated, Deactivating)
                | (Starting, Started)
                | (Starting, StartFailure)
                | (Started, Stopping)
                | (Stopping, Activated)
                | (StartFailure, Deactivating)
                | (Deactivating, Resolved)
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unregistered,
            1 => Self::Pending,
            2 => Self::Resolved,
            3 => Self::Activating,
            4 => Self::Activated,
            5 => Self::Starting,
            6 => Self::Started,
            7 => Self::Stopping,
            8 => Self::Deactivating,
            _ => Self::StartFailure,
        }
    }
}

/// Lock-free holder for a `ComponentState`.
#[derive(Debug)]
pub struct AtomicComponentState(AtomicU8);

impl AtomicComponentState {
    pub fn new(state: ComponentState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ComponentState {
        ComponentState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` when the edge is legal; returns whether it moved.
    pub(crate) fn transition(&self, component: &str, next: ComponentState) -> bool {
        let current = self.get();
        if !current.can_transition_to(next) {
            warn!(
                "event=state_transition module=model status=refused component={} from={} to={}",
                component,
                current.as_str(),
                next.as_str()
            );
            return false;
        }
        self.0.store(next as u8, Ordering::Release);
        true
    }
}
