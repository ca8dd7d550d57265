//! Meson `.wrap` files.
//!
//! A wrap is a small INI file. Only the handful of keys quay reports on are
//! kept; the file itself is never rewritten.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;

use crate::util::fs::read_to_string;

/// Parsed `subprojects/<name>.wrap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapFile {
    pub name: String,
    /// `wrap-file`, `wrap-git`, ...
    pub kind: String,
    pub values: BTreeMap<String, String>,
}

impl WrapFile {
    pub fn parse(name: &str, text: &str) -> Self {
        let mut wrap = WrapFile {
            name: name.to_string(),
            ..Default::default()
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if wrap.kind.is_empty() && section.starts_with("wrap-") {
                    wrap.kind = section.to_string();
                }
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                wrap.values
                    .entry(key.trim().to_string())
                    .or_insert_with(|| value.trim().to_string());
            }
        }

        wrap
    }

    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::parse(&name, &read_to_string(path)?))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Directory the subproject is extracted into, relative to `subprojects/`.
    pub fn directory(&self) -> Option<&str> {
        self.get("directory")
    }

    /// Upstream version without the wrapdb revision, e.g. `10.2.0` for `10.2.0-1`.
    pub fn version(&self) -> String {
        if let Some(v) = self.get("wrapdb_version") {
            return strip_revision(v).to_string();
        }
        if let Some(rest) = self
            .directory()
            .and_then(|dir| dir.strip_prefix(self.name.as_str()))
            .and_then(|rest| rest.strip_prefix('-'))
        {
            return rest.to_string();
        }
        self.get("revision").unwrap_or_default().to_string()
    }

    /// Every path under `subprojects/` this wrap may have produced.
    ///
    /// Entries that would resolve outside `subprojects/` (`..`, absolute
    /// paths) are skipped.
    pub fn extracted_dirs(&self, subprojects: &Path) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for entry in std::iter::once(self.name.as_str()).chain(self.directory()) {
            if !is_contained(entry) {
                tracing::warn!(
                    "ignoring `{}` in {}.wrap: not a directory inside subprojects/",
                    entry,
                    self.name
                );
                continue;
            }
            let dir = subprojects.join(entry);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

/// A non-empty relative path made only of normal components.
fn is_contained(entry: &str) -> bool {
    let path = Path::new(entry);
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn strip_revision(version: &str) -> &str {
    match version.rsplit_once('-') {
        Some((upstream, rev)) if !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()) => {
            upstream
        }
        _ => version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FMT_WRAP: &str = "\
[wrap-file]
directory = fmt-10.2.0
source_url = https://github.com/fmtlib/fmt/archive/10.2.0.tar.gz
source_hash = 3ca91733
wrapdb_version = 10.2.0-1

[provide]
fmt = fmt_dep
";

    #[test]
    fn test_parse_wrap_file() {
        let wrap = WrapFile::parse("fmt", FMT_WRAP);

        assert_eq!(wrap.kind, "wrap-file");
        assert_eq!(wrap.directory(), Some("fmt-10.2.0"));
        assert_eq!(wrap.version(), "10.2.0");
        assert_eq!(wrap.get("fmt"), Some("fmt_dep"));
    }

    #[test]
    fn test_version_fallbacks() {
        let from_dir = WrapFile::parse("zlib", "[wrap-file]\ndirectory = zlib-1.3.1\n");
        assert_eq!(from_dir.version(), "1.3.1");

        let git = WrapFile::parse("foo", "[wrap-git]\nurl = https://x/foo.git\nrevision = v2.0\n");
        assert_eq!(git.kind, "wrap-git");
        assert_eq!(git.version(), "v2.0");

        assert_eq!(strip_revision("1.3.1-2"), "1.3.1");
        assert_eq!(strip_revision("1.0.0"), "1.0.0");
    }

    #[test]
    fn test_extracted_dirs() {
        let wrap = WrapFile::parse("fmt", FMT_WRAP);
        let dirs = wrap.extracted_dirs(Path::new("subprojects"));

        assert_eq!(
            dirs,
            vec![
                PathBuf::from("subprojects/fmt"),
                PathBuf::from("subprojects/fmt-10.2.0")
            ]
        );
    }

    #[test]
    fn test_extracted_dirs_stay_inside_subprojects() {
        for directory in ["../src", "/etc", "fmt/../../src", ".", ""] {
            let wrap = WrapFile::parse("fmt", &format!("[wrap-file]\ndirectory = {}\n", directory));
            assert_eq!(
                wrap.extracted_dirs(Path::new("subprojects")),
                vec![PathBuf::from("subprojects/fmt")],
                "directory = {:?}",
                directory
            );
        }

        let nested = WrapFile::parse("fmt", "[wrap-file]\ndirectory = vendor/fmt-10\n");
        assert_eq!(
            nested.extracted_dirs(Path::new("subprojects"))[1],
            PathBuf::from("subprojects/vendor/fmt-10")
        );

        let escaping_name = WrapFile::parse("..", "[wrap-file]\n");
        assert!(escaping_name.extracted_dirs(Path::new("subprojects")).is_empty());
    }
}
