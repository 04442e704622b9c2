//! Component naming.
//!
//! # Responsibility
//! - Parse and normalize `type:name` component identifiers.
//!
//! # Invariants
//! - A `ComponentName` always carries an explicit type prefix; bare input
//!   receives the default `service` prefix.
//! - Equality, ordering and hashing use the full normalized `type:name` form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Type prefix applied when the raw name does not carry one.
pub const DEFAULT_COMPONENT_TYPE: &str = "service";

static COMPONENT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([a-z][a-z0-9_-]*):)?([A-Za-z0-9_][A-Za-z0-9_.\-]*)$")
        .expect("valid component name regex")
});

/// Normalized component identifier, e.g. `service:org.acme.blob`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentName {
    full: String,
    split: usize,
}

impl ComponentName {
    /// Parses a raw identifier, applying the default type prefix if missing.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NameError::Empty);
        }
        let captures = COMPONENT_NAME_RE
            .captures(trimmed)
            .ok_or_else(|| NameError::Invalid(trimmed.to_string()))?;
        let kind = captures
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or(DEFAULT_COMPONENT_TYPE);
        let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        Ok(Self {
            full: format!("{kind}:{name}"),
            split: kind.len(),
        })
    }

    /// Type prefix (`service`, `extension`, ...).
    pub fn kind(&self) -> &str {
        &self.full[..self.split]
    }

    /// Bare name without the type prefix.
    pub fn name(&self) -> &str {
        &self.full[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl Display for ComponentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

impl TryFrom<String> for ComponentName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ComponentName {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ComponentName> for String {
    fn from(value: ComponentName) -> Self {
        value.full
    }
}

/// Component name parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    Empty,
    Invalid(String),
}

impl Display for NameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "component name must not be empty"),
            Self::Invalid(value) => write!(f, "component name is invalid: {value}"),
        }
    }
}

impl Error for NameError {}
