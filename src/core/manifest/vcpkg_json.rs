//! `vcpkg.json` manifest editing.
//!
//! Parsed as an ordered JSON value so keys the editor does not know about
//! survive untouched.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use crate::core::Dependency;

/// Key vcpkg uses for a minimum-version constraint.
pub const VERSION_GE: &str = "version>=";

/// In-memory `vcpkg.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct VcpkgManifest {
    root: Map<String, Value>,
}

impl VcpkgManifest {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("failed to parse vcpkg.json")?;
        match value {
            Value::Object(root) => Ok(VcpkgManifest { root }),
            _ => bail!("vcpkg.json must contain a JSON object"),
        }
    }

    /// A manifest with a name, a version and no dependencies.
    pub fn new_project(name: &str, version: &str) -> Self {
        let mut root = Map::new();
        root.insert(
            "$schema".into(),
            Value::from("https://raw.githubusercontent.com/microsoft/vcpkg-tool/main/docs/vcpkg.schema.json"),
        );
        root.insert("name".into(), Value::from(name));
        root.insert("version".into(), Value::from(version));
        root.insert("dependencies".into(), Value::Array(Vec::new()));
        VcpkgManifest { root }
    }

    pub fn to_json_string(&self) -> String {
        let mut text = serde_json::to_string_pretty(&self.root).unwrap_or_else(|_| "{}".into());
        text.push('\n');
        text
    }

    pub fn has_baseline(&self) -> bool {
        self.root.contains_key("builtin-baseline")
    }

    fn entries(&self) -> &[Value] {
        self.root
            .get("dependencies")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Declared dependencies. Versions come from `version>=` or `version`.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.entries().iter().filter_map(entry_to_dependency).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries()
            .iter()
            .position(|entry| entry_name(entry) == Some(name))
    }

    fn entries_mut(&mut self) -> &mut Vec<Value> {
        let slot = self
            .root
            .entry("dependencies")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(entries) => entries,
            _ => unreachable!("dependencies was just made an array"),
        }
    }

    /// Add `name`, or update its minimum version if already declared.
    ///
    /// An empty version declares the bare port name.
    pub fn set_dependency(&mut self, name: &str, version: &str) {
        let index = self.position(name);
        let entries = self.entries_mut();

        let Some(index) = index else {
            entries.push(new_entry(name, version));
            return;
        };

        if version.is_empty() {
            return;
        }

        match &mut entries[index] {
            Value::Object(obj) => {
                let mut updated = Map::new();
                let mut placed = false;
                for (key, value) in std::mem::take(obj) {
                    if key == "version" || key == VERSION_GE {
                        if !placed {
                            updated.insert(VERSION_GE.into(), Value::from(version));
                            placed = true;
                        }
                    } else {
                        updated.insert(key, value);
                    }
                }
                if !placed {
                    updated.insert(VERSION_GE.into(), Value::from(version));
                }
                *obj = updated;
            }
            other => *other = new_entry(name, version),
        }
    }

    /// Remove `name`. Returns false when it was not declared.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let Some(index) = self.position(name) else {
            return false;
        };
        self.entries_mut().remove(index);
        true
    }
}

fn new_entry(name: &str, version: &str) -> Value {
    if version.is_empty() {
        return Value::from(name);
    }
    let mut obj = Map::new();
    obj.insert("name".into(), Value::from(name));
    obj.insert(VERSION_GE.into(), Value::from(version));
    Value::Object(obj)
}

fn entry_name(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(name) => Some(name),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str),
        _ => None,
    }
}

fn entry_to_dependency(entry: &Value) -> Option<Dependency> {
    let name = entry_name(entry)?;
    let version = entry
        .get(VERSION_GE)
        .or_else(|| entry.get("version"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(Dependency::new(name, version))
}
