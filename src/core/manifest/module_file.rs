//! `MODULE.bazel` editing.
//!
//! Only `bazel_dep(...)` calls are touched. Everything else in the file,
//! comments and formatting included, is left byte-for-byte intact.

use std::ops::Range;
use std::sync::OnceLock;

use regex::{NoExpand, Regex};

use crate::core::Dependency;

fn bazel_dep_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"bazel_dep\s*\(([^)]*)\)").expect("valid regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("valid regex"))
}

fn version_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"version\s*=\s*"[^"]*""#).expect("valid regex"))
}

fn module_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*module\s*\(\s*name\s*=\s*"([^"]+)""#).expect("valid regex")
    })
}

/// One `bazel_dep(...)` call found in the file.
#[derive(Debug, Clone)]
struct DepCall {
    span: Range<usize>,
    args: Range<usize>,
    name: String,
    version: String,
}

/// In-memory `MODULE.bazel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    text: String,
}

impl ModuleFile {
    pub fn parse(text: impl Into<String>) -> Self {
        ModuleFile { text: text.into() }
    }

    /// Fresh module declaration.
    pub fn new_module(name: &str, version: &str) -> Self {
        ModuleFile {
            text: format!("module(name = \"{}\", version = \"{}\")\n", name, version),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn module_name(&self) -> Option<String> {
        module_name_re()
            .captures(&self.text)
            .map(|c| c[1].to_string())
    }

    fn calls(&self) -> Vec<DepCall> {
        bazel_dep_re()
            .captures_iter(&self.text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                if self.is_commented(whole.start()) {
                    return None;
                }
                let args = caps.get(1)?;
                let mut name = None;
                let mut version = String::new();
                for attr in attr_re().captures_iter(args.as_str()) {
                    match &attr[1] {
                        "name" => name = Some(attr[2].to_string()),
                        "version" => version = attr[2].to_string(),
                        _ => {}
                    }
                }
                Some(DepCall {
                    span: whole.range(),
                    args: args.range(),
                    name: name?,
                    version,
                })
            })
            .collect()
    }

    /// True when a `#` precedes `offset` on its line.
    fn is_commented(&self, offset: usize) -> bool {
        let line_start = self.text[..offset].rfind('\n').map_or(0, |i| i + 1);
        self.text[line_start..offset].contains('#')
    }

    /// Declared dependencies in file order.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.calls()
            .into_iter()
            .map(|call| Dependency::new(call.name, call.version))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c.name == name)
    }

    /// Pin `name` to `version`, updating the existing call or appending a new one.
    pub fn set_dependency(&mut self, name: &str, version: &str) {
        let Some(call) = self.calls().into_iter().find(|c| c.name == name) else {
            if !self.text.is_empty() && !self.text.ends_with('\n') {
                self.text.push('\n');
            }
            self.text.push_str(&format!(
                "bazel_dep(name = \"{}\", version = \"{}\")\n",
                name, version
            ));
            return;
        };

        if call.version == version {
            return;
        }

        let args = &self.text[call.args.clone()];
        let replacement = if version_attr_re().is_match(args) {
            version_attr_re()
                .replace(args, NoExpand(&format!("version = \"{}\"", version)))
                .into_owned()
        } else {
            format!("{}, version = \"{}\"", args.trim_end().trim_end_matches(','), version)
        };
        self.text.replace_range(call.args, &replacement);
    }

    /// Remove the `bazel_dep` call for `name`. Returns false when it was not declared.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let Some(call) = self.calls().into_iter().find(|c| c.name == name) else {
            return false;
        };

        let mut end = call.span.end;
        if self.text[end..].starts_with("\r\n") {
            end += 2;
        } else if self.text[end..].starts_with('\n') {
            end += 1;
        }
        self.text.replace_range(call.span.start..end, "");
        true
    }
}
