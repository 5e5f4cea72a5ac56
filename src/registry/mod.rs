//! Binding registry
//!
//! Owns all metadata (types, commands, variables) and the live map of
//! instances. Registration is single-writer / multi-reader and happens
//! during host startup; after that the registry is read-mostly.

pub mod binding;
pub mod instance;
pub mod provider;

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{DispatchError, RegistryError};
use binding::{BindingSet, VariableBinding};
use instance::{InstanceHandle, KindInstanceTable};
use provider::ProviderDescriptor;

#[derive(Default)]
struct Namespace {
    commands: IndexMap<String, BindingSet>,
    variables: IndexMap<String, VariableBinding>,
}

struct KindEntry {
    kind_name: String,
    commands: RwLock<IndexMap<String, BindingSet>>,
    variables: RwLock<IndexMap<String, VariableBinding>>,
    default_claimed: RwLock<bool>,
    instances: KindInstanceTable,
}

impl KindEntry {
    fn new(kind_name: String) -> Self {
        Self {
            kind_name,
            commands: RwLock::new(IndexMap::new()),
            variables: RwLock::new(IndexMap::new()),
            default_claimed: RwLock::new(false),
            instances: KindInstanceTable::default(),
        }
    }
}

/// What a resolved path turned out to name.
pub enum Resolved {
    Command { set: BindingSet, receiver: Receiver },
    Variable { binding: VariableBinding, receiver: Receiver },
}

/// The instance a resolved kind-scoped member should be invoked against.
pub enum Receiver {
    /// A static member; no instance applies.
    None,
    /// A live instance handle, upgraded from the registry's weak slot.
    Instance(InstanceHandle),
    /// A kind-scoped member was resolved, but the default or named
    /// instance's weak handle was already empty at lookup time (never
    /// attached, or dropped by the host since).
    Expired { kind: String, instance_name: Option<String> },
}

impl Receiver {
    /// Resolves to the instance to invoke against, or `InstanceExpired` if
    /// the kind-scoped member it was resolved against has no live instance.
    pub fn resolve(self) -> Result<Option<InstanceHandle>, DispatchError> {
        match self {
            Receiver::None => Ok(None),
            Receiver::Instance(handle) => Ok(Some(handle)),
            Receiver::Expired { kind, instance_name } => Err(DispatchError::InstanceExpired { kind, instance_name }),
        }
    }
}

enum PathShape<'a> {
    Bare(&'a str),
    Kind { kind: &'a str, instance: Option<&'a str>, member: &'a str },
}

fn parse_path(path: &str) -> PathShape<'_> {
    if let Some(paren_start) = path.find('(') {
        if let Some(paren_end) = path[paren_start..].find(')').map(|i| i + paren_start) {
            let kind = &path[..paren_start];
            let instance = &path[paren_start + 1..paren_end];
            let rest = &path[paren_end + 1..];
            let member = rest.strip_prefix('.').unwrap_or(rest);
            return PathShape::Kind { kind, instance: Some(instance), member };
        }
    }
    if let Some(dot) = path.find('.') {
        return PathShape::Kind { kind: &path[..dot], instance: None, member: &path[dot + 1..] };
    }
    PathShape::Bare(path)
}

/// Owner of all registered types, bindings, and live instances.
pub struct Registry {
    statics: RwLock<Namespace>,
    kinds: RwLock<IndexMap<String, Arc<KindEntry>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self { statics: RwLock::new(Namespace::default()), kinds: RwLock::new(IndexMap::new()) }
    }

    /// Scan a provider descriptor's members, hoisting static members into
    /// the global namespace and merging instance members into the kind's
    /// per-kind binding sets. Returns non-fatal warnings (e.g. a duplicate
    /// instance variable skipped in favor of the first declaration;
    /// first-registration-wins) or a hard [`RegistryError`] for invariants
    /// that are always fatal: a duplicate static variable name, or two
    /// types in one kind both claiming to be the default.
    pub fn register_type(&self, descriptor: ProviderDescriptor) -> Result<Vec<String>, RegistryError> {
        let mut warnings = Vec::new();

        if descriptor.is_static {
            let mut statics = self.statics.write();
            for var_spec in descriptor.variables {
                let key = var_spec.name.to_lowercase();
                if statics.variables.contains_key(&key) {
                    return Err(RegistryError::DuplicateStaticVariable(var_spec.name));
                }
                statics.variables.insert(
                    key,
                    VariableBinding {
                        name: var_spec.name,
                        description: var_spec.description,
                        type_name: var_spec.type_name,
                        persist: var_spec.persist,
                        get: var_spec.get,
                        set: var_spec.set,
                        clear: var_spec.clear,
                    },
                );
            }
            for cmd_spec in descriptor.commands {
                let key = cmd_spec.name.to_lowercase();
                let name = cmd_spec.name.clone();
                let set = statics.commands.entry(key).or_insert_with(|| BindingSet { name, overloads: Vec::new() });
                set.push(cmd_spec.into_binding());
            }
            return Ok(warnings);
        }

        let kind_key = descriptor.kind_name.to_lowercase();
        let entry = {
            let mut kinds = self.kinds.write();
            kinds
                .entry(kind_key)
                .or_insert_with(|| Arc::new(KindEntry::new(descriptor.kind_name.clone())))
                .clone()
        };

        if descriptor.is_default {
            let mut claimed = entry.default_claimed.write();
            if *claimed {
                return Err(RegistryError::DuplicateDefaultType(entry.kind_name.clone()));
            }
            *claimed = true;
        }

        {
            let mut variables = entry.variables.write();
            for var_spec in descriptor.variables {
                let key = var_spec.name.to_lowercase();
                if variables.contains_key(&key) {
                    warnings.push(format!(
                        "kind '{}': duplicate variable '{}' skipped (first declaration wins)",
                        entry.kind_name, var_spec.name
                    ));
                    continue;
                }
                variables.insert(
                    key,
                    VariableBinding {
                        name: var_spec.name,
                        description: var_spec.description,
                        type_name: var_spec.type_name,
                        persist: var_spec.persist,
                        get: var_spec.get,
                        set: var_spec.set,
                        clear: var_spec.clear,
                    },
                );
            }
        }
        {
            let mut commands = entry.commands.write();
            for cmd_spec in descriptor.commands {
                let key = cmd_spec.name.to_lowercase();
                let name = cmd_spec.name.clone();
                let set = commands.entry(key).or_insert_with(|| BindingSet { name, overloads: Vec::new() });
                set.push(cmd_spec.into_binding());
            }
        }

        Ok(warnings)
    }

    pub fn attach_default(&self, kind_name: &str, instance: InstanceHandle) {
        self.kind_entry(kind_name).instances.attach_default(instance);
    }

    pub fn attach_named(&self, kind_name: &str, name: &str, instance: InstanceHandle) {
        self.kind_entry(kind_name).instances.attach_named(name.to_string(), instance);
    }

    pub fn detach_named(&self, kind_name: &str, name: &str) -> bool {
        match self.find_kind(kind_name) {
            Some(entry) => entry.instances.detach_named(name),
            None => false,
        }
    }

    pub fn detach_default(&self, kind_name: &str, instance: &InstanceHandle) -> bool {
        match self.find_kind(kind_name) {
            Some(entry) => entry.instances.detach_default(instance),
            None => false,
        }
    }

    /// Resolve `"cmd"`, `"kind.cmd"`, or `"kind(name).cmd"`. A kind-scoped
    /// member whose instance has expired still resolves — to a `Receiver`
    /// the caller must handle as `InstanceExpired` before invoking.
    pub fn lookup(&self, path: &str) -> Option<Resolved> {
        match parse_path(path) {
            PathShape::Bare(name) => self.lookup_static(name),
            PathShape::Kind { kind, instance: None, member } => {
                let entry = self.find_kind(kind)?;
                let receiver = match entry.instances.default_instance() {
                    Some(handle) => Receiver::Instance(handle),
                    None => Receiver::Expired { kind: entry.kind_name.clone(), instance_name: None },
                };
                self.lookup_in_kind(&entry, member, receiver)
            }
            PathShape::Kind { kind, instance: Some(instance_name), member } => {
                let entry = self.find_kind(kind)?;
                let receiver = match entry.instances.named_instance(instance_name) {
                    Some(handle) => Receiver::Instance(handle),
                    None => Receiver::Expired {
                        kind: entry.kind_name.clone(),
                        instance_name: Some(instance_name.to_string()),
                    },
                };
                self.lookup_in_kind(&entry, member, receiver)
            }
        }
    }

    fn lookup_static(&self, name: &str) -> Option<Resolved> {
        let key = name.to_lowercase();
        let statics = self.statics.read();
        if let Some(set) = statics.commands.get(&key) {
            return Some(Resolved::Command { set: set.clone(), receiver: Receiver::None });
        }
        if let Some(var) = statics.variables.get(&key) {
            return Some(Resolved::Variable { binding: var.clone(), receiver: Receiver::None });
        }
        None
    }

    fn lookup_in_kind(&self, entry: &KindEntry, member: &str, receiver: Receiver) -> Option<Resolved> {
        let key = member.to_lowercase();
        if let Some(set) = entry.commands.read().get(&key) {
            return Some(Resolved::Command { set: set.clone(), receiver });
        }
        if let Some(var) = entry.variables.read().get(&key) {
            return Some(Resolved::Variable { binding: var.clone(), receiver });
        }
        None
    }

    fn find_kind(&self, kind_name: &str) -> Option<Arc<KindEntry>> {
        self.kinds.read().get(&kind_name.to_lowercase()).cloned()
    }

    fn kind_entry(&self, kind_name: &str) -> Arc<KindEntry> {
        let key = kind_name.to_lowercase();
        if let Some(entry) = self.kinds.read().get(&key) {
            return entry.clone();
        }
        self.kinds
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(KindEntry::new(kind_name.to_string())))
            .clone()
    }

    /// Next completion candidate strictly greater than `last`.
    /// Candidates are static command names, static variable names suffixed
    /// with `=`, and kind name prefixes. `last = None` returns the first;
    /// a `last` past the end wraps around.
    pub fn complete(&self, prefix: &str, last: Option<&str>) -> Option<String> {
        let prefix_lower = prefix.to_lowercase();
        let mut candidates = Vec::new();
        {
            let statics = self.statics.read();
            for set in statics.commands.values() {
                if set.name.to_lowercase().starts_with(&prefix_lower) {
                    candidates.push(set.name.clone());
                }
            }
            for var in statics.variables.values() {
                if var.name.to_lowercase().starts_with(&prefix_lower) {
                    candidates.push(format!("{}=", var.name));
                }
            }
        }
        {
            let kinds = self.kinds.read();
            for entry in kinds.values() {
                if entry.kind_name.to_lowercase().starts_with(&prefix_lower) {
                    candidates.push(entry.kind_name.clone());
                }
            }
        }
        candidates.sort_by_key(|s| s.to_lowercase());
        candidates.dedup();
        if candidates.is_empty() {
            return None;
        }
        match last {
            None => Some(candidates[0].clone()),
            Some(last) => {
                let last_lower = last.to_lowercase();
                candidates
                    .iter()
                    .find(|c| c.to_lowercase() > last_lower)
                    .cloned()
                    .or_else(|| Some(candidates[0].clone()))
            }
        }
    }

    pub fn list_commands(&self) -> Vec<String> {
        self.statics.read().commands.values().map(|s| s.name.clone()).collect()
    }

    pub fn list_variables(&self) -> Vec<String> {
        self.statics.read().variables.values().map(|v| v.name.clone()).collect()
    }

    /// Every `persist = true` variable's lookup path — static variables by
    /// bare name, and instance-scoped variables for every kind that
    /// currently has a default and/or named instance attached, as
    /// `"kind.var"`/`"kind(name).var"`. Each path is ready to feed straight
    /// back into [`Registry::lookup`] for a persistence snapshot; a kind
    /// with no live instance at all contributes nothing, since there is no
    /// receiver to capture a value from.
    pub fn list_persistent_variable_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> =
            self.statics.read().variables.values().filter(|v| v.persist).map(|v| v.name.clone()).collect();

        for entry in self.kinds.read().values() {
            let names: Vec<String> =
                entry.variables.read().values().filter(|v| v.persist).map(|v| v.name.clone()).collect();
            if names.is_empty() {
                continue;
            }
            if entry.instances.has_default() {
                paths.extend(names.iter().map(|name| format!("{}.{}", entry.kind_name, name)));
            }
            for instance_name in entry.instances.named_names() {
                paths.extend(names.iter().map(|name| format!("{}({}).{}", entry.kind_name, instance_name, name)));
            }
        }
        paths
    }

    pub fn list_kinds(&self) -> Vec<String> {
        self.kinds.read().values().map(|e| e.kind_name.clone()).collect()
    }

    pub fn list_named_instances(&self, kind_name: &str) -> Vec<String> {
        match self.find_kind(kind_name) {
            Some(entry) => entry.instances.named_names(),
            None => Vec::new(),
        }
    }

    pub fn has_default_instance(&self, kind_name: &str) -> bool {
        self.find_kind(kind_name).is_some_and(|entry| entry.instances.has_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::binding::{Binding, Parameter, SyncFn, Value};
    use crate::registry::provider::{CommandSpec, VariableSpec};
    use std::sync::Arc;

    fn command(name: &str, arity: usize) -> CommandSpec {
        CommandSpec {
            name: name.to_string(),
            description: String::new(),
            parameters: (0..arity).map(|i| Parameter::new(format!("a{i}"), "string")).collect(),
            is_async: false,
            handler: Arc::new(SyncFn(|_, _| Ok(()))),
        }
    }

    #[test]
    fn lookup_is_case_insensitive_and_unique() {
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_command(command("Echo", 1)))
            .unwrap();
        assert!(matches!(registry.lookup("echo"), Some(Resolved::Command { .. })));
        assert!(matches!(registry.lookup("ECHO"), Some(Resolved::Command { .. })));
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn duplicate_static_variable_name_fails_registration() {
        let registry = Registry::new();
        let var = |name: &str| VariableSpec {
            name: name.to_string(),
            description: String::new(),
            type_name: "i32".into(),
            persist: false,
            get: Arc::new(|_| Value::I32(0)),
            set: None,
            clear: None,
        };
        registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_variable(var("MaxSize")))
            .unwrap();
        let err = registry
            .register_type(ProviderDescriptor::new("").is_static(true).with_variable(var("MaxSize")))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateStaticVariable("MaxSize".into()));
    }

    #[test]
    fn instance_routing_resolves_default_and_named() {
        #[derive(Debug)]
        struct Cache;
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("Cache").with_command(command("Clear", 0)))
            .unwrap();
        let default_instance: InstanceHandle = Arc::new(Cache);
        let named_instance: InstanceHandle = Arc::new(Cache);
        registry.attach_default("Cache", default_instance.clone());
        registry.attach_named("Cache", "L2", named_instance.clone());

        match registry.lookup("Cache.Clear") {
            Some(Resolved::Command { receiver: Receiver::Instance(r), .. }) => assert!(Arc::ptr_eq(&r, &default_instance)),
            _ => panic!("expected default instance routing"),
        }
        match registry.lookup("Cache(L2).Clear") {
            Some(Resolved::Command { receiver: Receiver::Instance(r), .. }) => assert!(Arc::ptr_eq(&r, &named_instance)),
            _ => panic!("expected named instance routing"),
        }
    }

    #[test]
    fn missing_default_instance_resolves_as_expired_receiver() {
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("Cache").with_command(command("Clear", 0)))
            .unwrap();

        match registry.lookup("Cache.Clear") {
            Some(Resolved::Command { receiver: Receiver::Expired { kind, instance_name }, .. }) => {
                assert_eq!(kind, "Cache");
                assert_eq!(instance_name, None);
            }
            _ => panic!("expected an expired receiver"),
        }
    }

    #[test]
    fn duplicate_default_type_for_one_kind_fails_registration() {
        let registry = Registry::new();
        registry
            .register_type(ProviderDescriptor::new("Cache").is_default(true).with_command(command("Clear", 0)))
            .unwrap();
        let err = registry
            .register_type(ProviderDescriptor::new("Cache").is_default(true).with_command(command("Flush", 0)))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateDefaultType("Cache".into()));
    }

    #[test]
    fn completion_cycles_through_sorted_candidates_once() {
        let registry = Registry::new();
        registry
            .register_type(
                ProviderDescriptor::new("")
                    .is_static(true)
                    .with_command(command("Alpha", 0))
                    .with_command(command("Beta", 0))
                    .with_command(command("Gamma", 0)),
            )
            .unwrap();

        let first = registry.complete("", None).unwrap();
        let second = registry.complete("", Some(&first)).unwrap();
        let third = registry.complete("", Some(&second)).unwrap();
        let wrapped = registry.complete("", Some(&third)).unwrap();
        assert_eq!(vec![first, second, third, wrapped.clone()], vec!["Alpha", "Beta", "Gamma", "Alpha"]);
        assert_eq!(wrapped, "Alpha");
    }
}
