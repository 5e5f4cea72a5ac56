//! Variable persistence
//!
//! Captures the names and current values of every `persist = true`
//! variable — static or instance-scoped — into a neutral
//! `{ path -> optional text }` mapping, and restores them later by calling
//! each variable's `set`/`clear` in the saved order. The wire format itself
//! is JSON (`serde_json`, already an ambient dependency), but nothing here
//! depends on that choice — the map is the contract.

use indexmap::IndexMap;

use crate::convert::ConverterRegistry;
use crate::registry::{Registry, Resolved};

pub type Snapshot = IndexMap<String, Option<String>>;

/// Capture every persistent variable's current value, stringified via its
/// `Display` impl. Restoring relies on round-tripping through the declared
/// type's string form, so the converter used on restore must accept
/// whatever the `Display` impl produces. A kind-scoped path whose instance
/// vanished between enumeration and lookup is skipped rather than failing
/// the whole capture — there is nothing to snapshot a value from.
pub fn capture(registry: &Registry) -> Snapshot {
    registry
        .list_persistent_variable_paths()
        .into_iter()
        .filter_map(|path| {
            let Some(Resolved::Variable { binding, receiver }) = registry.lookup(&path) else {
                return None;
            };
            let receiver = receiver.resolve().ok()?;
            let value = (binding.get)(receiver);
            Some((path, Some(value.to_string())))
        })
        .collect()
}

pub fn to_json(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}

pub fn from_json(text: &str) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_str(text)
}

/// One variable that failed to restore. Collected rather than raised so a
/// single bad entry does not abort the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreError {
    pub name: String,
    pub message: String,
}

/// Restore a snapshot in its stored order, calling `set`/`clear` per
/// variable. Returns every per-variable failure; an empty result means a
/// clean restore.
pub fn restore(registry: &Registry, converters: &ConverterRegistry, snapshot: &Snapshot) -> Vec<RestoreError> {
    let mut errors = Vec::new();
    for (name, text) in snapshot {
        if let Err(message) = restore_one(registry, converters, name, text.as_deref()) {
            errors.push(RestoreError { name: name.clone(), message });
        }
    }
    errors
}

fn restore_one(
    registry: &Registry,
    converters: &ConverterRegistry,
    name: &str,
    text: Option<&str>,
) -> Result<(), String> {
    let Some(Resolved::Variable { binding, receiver }) = registry.lookup(name) else {
        return Err(format!("no such variable '{name}'"));
    };
    let receiver = receiver.resolve().map_err(|err| err.to_string())?;
    match text {
        None => match &binding.clear {
            Some(clear) => clear(receiver),
            None => Err(format!("variable '{name}' has no clear operation")),
        },
        Some(text) => match converters.convert(&binding.type_name, text) {
            Some(value) => match &binding.set {
                Some(set) => set(receiver, value),
                None => Err(format!("variable '{name}' is read-only")),
            },
            None => Err(format!("could not convert '{text}' to {}", binding.type_name)),
        },
    }
}
