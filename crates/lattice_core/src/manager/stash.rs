//! Registration changes collected while the manager is running.

use crate::model::descriptor::ComponentDescriptor;
use crate::model::name::ComponentName;
use indexmap::IndexSet;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Stash {
    to_add: Vec<Arc<ComponentDescriptor>>,
    to_remove: IndexSet<ComponentName>,
}

impl Stash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, descriptor: Arc<ComponentDescriptor>) {
        self.to_add.push(descriptor);
    }

    pub fn remove(&mut self, name: ComponentName) {
        self.to_remove.insert(name);
    }

    pub fn is_adding(&self, name: &ComponentName) -> bool {
        self.to_add
            .iter()
            .any(|descriptor| descriptor.all_names().any(|candidate| candidate == name))
    }

    pub fn is_removing(&self, name: &ComponentName) -> bool {
        self.to_remove.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn to_add(&self) -> &[Arc<ComponentDescriptor>] {
        &self.to_add
    }

    pub fn to_remove(&self) -> impl Iterator<Item = &ComponentName> {
        self.to_remove.iter()
    }

    pub(crate) fn into_parts(self) -> (IndexSet<ComponentName>, Vec<Arc<ComponentDescriptor>>) {
        (self.to_remove, self.to_add)
    }
}

#[cfg(test)]
mod tests {
    use super::Stash;
    use crate::model::descriptor::ComponentDescriptor;
    use crate::model::name::ComponentName;
    use std::sync::Arc;

    #[test]
    fn tracks_additions_by_any_name() {
        let mut stash = Stash::new();
        assert!(stash.is_empty());
        stash.add(Arc::new(
            ComponentDescriptor::builder("org.acme.a")
                .alias("org.acme.old-a")
                .build()
                .expect("descriptor"),
        ));
        let alias = ComponentName::parse("org.acme.old-a").expect("alias");
        assert!(stash.is_adding(&alias));
        assert!(!stash.is_removing(&alias));

        stash.remove(alias.clone());
        stash.remove(alias.clone());
        assert_eq!(stash.to_remove().count(), 1);
        let (removals, additions) = stash.into_parts();
        assert_eq!(removals.len(), 1);
        assert_eq!(additions.len(), 1);
    }
}
