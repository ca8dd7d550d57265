//! Dependency records returned by list, search and info.

use std::fmt;

use serde::Serialize;

/// A declared or discovered package reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    /// May be empty when the manifest does not pin one.
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Dependency {
            name: name.into(),
            version: version.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.version)
        }
    }
}

/// Registry metadata for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyInfo {
    pub name: String,
    /// Latest known version unless a specific one was asked for.
    pub version: String,
    pub description: String,
    pub homepage: String,
    pub license: String,
    pub maintainers: Vec<String>,
    /// Names of the packages this one depends on.
    pub dependencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Dependency::new("fmt", "10.2.1").to_string(), "fmt 10.2.1");
        assert_eq!(Dependency::new("zlib", "").to_string(), "zlib");
    }
}
