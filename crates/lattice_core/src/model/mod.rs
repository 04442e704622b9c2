//! Component identity model.
//!
//! # Responsibility
//! - Define component names, lifecycle states and descriptors shared by the
//!   registry, the instance wrapper and the manager.
//!
//! # Invariants
//! - Descriptors are immutable; runtime state lives in `RegistrationInfo`.

pub mod descriptor;
pub mod name;
pub mod state;
