//! Content fingerprints for cache keys.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// SHA-256 over a sequence of components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    pub fn update_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    /// Add a string component followed by a separator.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add a file's contents.
    pub fn update_file(&mut self, path: &Path) -> Result<&mut Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read {} for hashing", path.display()))?;
        Ok(self.update_bytes(&data))
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// The first `len` hex digits.
    pub fn finish_short(self, len: usize) -> String {
        let mut digest = self.finish();
        digest.truncate(len);
        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_and_bytes_agree() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Dockerfile");
        std::fs::write(&path, "hello").unwrap();

        let mut from_file = Fingerprint::new();
        from_file.update_file(&path).unwrap();
        assert_eq!(
            from_file.finish(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let mut short = Fingerprint::new();
        short.update_bytes(b"hello");
        assert_eq!(short.finish_short(12), "2cf24dba5fb0");
    }

    #[test]
    fn test_components_are_separated() {
        let mut a = Fingerprint::new();
        a.update_str("ab").update_str("c");
        let mut b = Fingerprint::new();
        b.update_str("a").update_str("bc");

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_missing_file() {
        assert!(Fingerprint::new()
            .update_file(Path::new("/nonexistent/Dockerfile"))
            .is_err());
    }
}
