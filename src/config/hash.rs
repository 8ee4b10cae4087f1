//! Configuration hashing for change detection.
//!
//! A saved plan records the hash of the configuration it was made from, and
//! apply refuses to run it once the hash no longer matches.

use sha2::{Digest, Sha256};

use super::tree::{Config, Module};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire module tree.
    ///
    /// This hash changes when any module file changes or moves in the tree.
    #[must_use]
    pub fn hash_config(&self, config: &Config) -> String {
        let mut hasher = Sha256::new();
        for module in config.modules() {
            hasher.update(self.hash_module(module).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single module.
    #[must_use]
    pub fn hash_module(&self, module: &Module) -> String {
        let mut hasher = Sha256::new();
        hasher.update(module.path.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(module.text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn load(main: &str, child: &str) -> Config {
        ConfigParser::new()
            .with_source("main.yaml", main)
            .with_source("child.yaml", child)
            .load_file("main.yaml")
            .expect("load")
    }

    const MAIN: &str = "modules:\n  - name: c\n    source: child.yaml\n";

    #[test]
    fn test_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let a = hasher.hash_config(&load(MAIN, "resources: []\n"));
        let b = hasher.hash_config(&load(MAIN, "resources: []\n"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_child_change_changes_hash() {
        let hasher = ConfigHasher::new();
        let a = hasher.hash_config(&load(MAIN, "resources: []\n"));
        let b = hasher.hash_config(&load(
            MAIN,
            "resources:\n  - type: test_instance\n    name: x\n",
        ));
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let full_hash = "abcdef1234567890abcdef1234567890";
        let short = hasher.short_hash(full_hash);

        assert_eq!(short, "abcdef12");
        assert_eq!(short.len(), 8);
    }

    #[test]
    fn test_hashes_match() {
        assert!(ConfigHasher::hashes_match("abc123", "abc123"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc124"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc12"));
    }
}
