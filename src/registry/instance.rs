//! Instance tables
//!
//! Instances are host objects that back a kind's non-static bindings. The
//! registry never keeps one alive: it stores a [`std::sync::Weak`] and
//! upgrades it on lookup, reaping dead named entries lazily on any
//! mutating or enumerating access.

use parking_lot::RwLock;
use std::any::Any;
use std::sync::{Arc, Weak};

/// A live, strongly-held instance handle, upgraded from the registry's weak
/// slot at resolution time. Command/variable closures downcast this to the
/// concrete receiver type they expect.
pub type InstanceHandle = Arc<dyn Any + Send + Sync>;
type WeakInstance = Weak<dyn Any + Send + Sync>;

#[derive(Default)]
pub(crate) struct KindInstances {
    default: Option<WeakInstance>,
    named: indexmap::IndexMap<String, WeakInstance>,
}

impl KindInstances {
    fn reap_named(&mut self) {
        self.named.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn attach_default(&mut self, instance: InstanceHandle) {
        self.default = Some(Arc::downgrade(&instance));
    }

    pub fn attach_named(&mut self, name: String, instance: InstanceHandle) {
        self.reap_named();
        self.named.insert(name, Arc::downgrade(&instance));
    }

    /// Idempotent: returns whether an entry was actually removed.
    pub fn detach_named(&mut self, name: &str) -> bool {
        self.reap_named();
        self.named.shift_remove(name).is_some()
    }

    /// Only succeeds if the stored weak handle still points at `instance`.
    pub fn detach_default(&mut self, instance: &InstanceHandle) -> bool {
        let still_current = self
            .default
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|current| Arc::ptr_eq(&current, instance));
        if still_current {
            self.default = None;
        }
        still_current
    }

    pub fn default_instance(&self) -> Option<InstanceHandle> {
        self.default.as_ref().and_then(Weak::upgrade)
    }

    pub fn named_instance(&mut self, name: &str) -> Option<InstanceHandle> {
        self.reap_named();
        self.named.get(name).and_then(Weak::upgrade)
    }

    pub fn named_names(&mut self) -> Vec<String> {
        self.reap_named();
        self.named.keys().cloned().collect()
    }

    pub fn has_default(&self) -> bool {
        self.default.as_ref().is_some_and(|w| w.strong_count() > 0)
    }
}

/// Per-kind lock around the instance table. Mutations (attach/detach) take
/// the write side; lookups take only a brief read lock to clone the handle.
pub(crate) struct KindInstanceTable {
    inner: RwLock<KindInstances>,
}

impl Default for KindInstanceTable {
    fn default() -> Self {
        Self { inner: RwLock::new(KindInstances::default()) }
    }
}

impl KindInstanceTable {
    pub fn attach_default(&self, instance: InstanceHandle) {
        self.inner.write().attach_default(instance);
    }

    pub fn attach_named(&self, name: String, instance: InstanceHandle) {
        self.inner.write().attach_named(name, instance);
    }

    pub fn detach_named(&self, name: &str) -> bool {
        self.inner.write().detach_named(name)
    }

    pub fn detach_default(&self, instance: &InstanceHandle) -> bool {
        self.inner.write().detach_default(instance)
    }

    pub fn default_instance(&self) -> Option<InstanceHandle> {
        self.inner.read().default_instance()
    }

    pub fn named_instance(&self, name: &str) -> Option<InstanceHandle> {
        self.inner.write().named_instance(name)
    }

    pub fn named_names(&self) -> Vec<String> {
        self.inner.write().named_names()
    }

    pub fn has_default(&self) -> bool {
        self.inner.read().has_default()
    }
}
