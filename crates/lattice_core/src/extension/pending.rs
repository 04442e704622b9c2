//! Queue of extensions waiting for their target component to activate.
//!
//! # Invariants
//! - Buckets preserve insertion order; replay happens in that order.
//! - An extension appears at most once per bucket.
//! - Empty buckets are removed, so "is anything pending for X" is exact.

use crate::extension::Extension;
use crate::model::name::ComponentName;
use dashmap::DashMap;
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Target-name keyed pending extension queue.
#[derive(Debug, Default)]
pub struct PendingExtensions {
    buckets: DashMap<ComponentName, IndexSet<Arc<Extension>>>,
}

impl PendingExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `extension` under `target`; returns false when already queued.
    pub fn enqueue(&self, target: &ComponentName, extension: Arc<Extension>) -> bool {
        self.buckets
            .entry(target.clone())
            .or_default()
            .insert(extension)
    }

    /// Atomically removes and returns every extension queued under `target`.
    pub fn drain(&self, target: &ComponentName) -> Vec<Arc<Extension>> {
        self.buckets
            .remove(target)
            .map(|(_, bucket)| bucket.into_iter().collect())
            .unwrap_or_default()
    }

    /// Removes one extension by identity; returns whether it was queued.
    pub fn remove(&self, target: &ComponentName, extension: &Extension) -> bool {
        let removed = match self.buckets.get_mut(target) {
            Some(mut bucket) => bucket.shift_remove(extension),
            None => false,
        };
        if removed {
            self.buckets.remove_if(target, |_, bucket| bucket.is_empty());
        }
        removed
    }

    /// Drops every queued extension contributed by `origin`.
    pub fn remove_from_origin(&self, origin: &ComponentName) -> usize {
        let mut removed = 0;
        for mut bucket in self.buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|extension| extension.origin() != origin);
            removed += before - bucket.len();
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    pub fn pending_for(&self, target: &ComponentName) -> Vec<Arc<Extension>> {
        self.buckets
            .get(target)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_pending(&self, target: &ComponentName) -> bool {
        self.buckets.contains_key(target)
    }

    /// Target names that still have queued extensions.
    pub fn targets(&self) -> Vec<ComponentName> {
        let mut names: Vec<ComponentName> =
            self.buckets.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Queued extensions grouped by contributing component.
    pub fn by_origin(&self) -> BTreeMap<ComponentName, Vec<Arc<Extension>>> {
        let mut grouped: BTreeMap<ComponentName, Vec<Arc<Extension>>> = BTreeMap::new();
        for bucket in self.buckets.iter() {
            for extension in bucket.iter() {
                grouped
                    .entry(extension.origin().clone())
                    .or_default()
                    .push(Arc::clone(extension));
            }
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::PendingExtensions;
    use crate::extension::Extension;
    use crate::model::name::ComponentName;
    use std::sync::Arc;

    fn name(raw: &str) -> ComponentName {
        ComponentName::parse(raw).expect("valid name")
    }

    fn extension(origin: &str, target: &str) -> Arc<Extension> {
        Arc::new(Extension::new(name(origin), name(target), "point", vec![]))
    }

    #[test]
    fn drains_in_insertion_order() {
        let queue = PendingExtensions::new();
        let target = name("target");
        let first = extension("a", "target");
        let second = extension("b", "target");
        let third = extension("c", "target");
        for item in [&first, &second, &third] {
            assert!(queue.enqueue(&target, Arc::clone(item)));
        }

        let drained = queue.drain(&target);
        assert_eq!(drained, vec![first, second, third]);
        assert!(!queue.is_pending(&target));
        assert!(queue.drain(&target).is_empty());
    }

    #[test]
    fn rejects_duplicate_entries() {
        let queue = PendingExtensions::new();
        let target = name("target");
        let item = extension("a", "target");
        assert!(queue.enqueue(&target, Arc::clone(&item)));
        assert!(!queue.enqueue(&target, item));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_by_identity_drops_empty_bucket() {
        let queue = PendingExtensions::new();
        let target = name("target");
        let item = extension("a", "target");
        queue.enqueue(&target, Arc::clone(&item));

        assert!(queue.remove(&target, &item));
        assert!(!queue.is_pending(&target));
        assert!(!queue.remove(&target, &item));
    }

    #[test]
    fn removes_everything_contributed_by_origin() {
        let queue = PendingExtensions::new();
        queue.enqueue(&name("x"), extension("a", "x"));
        queue.enqueue(&name("y"), extension("a", "y"));
        queue.enqueue(&name("y"), extension("b", "y"));

        assert_eq!(queue.remove_from_origin(&name("a")), 2);
        assert_eq!(queue.targets(), vec![name("y")]);
        assert_eq!(queue.by_origin().len(), 1);
    }
}
