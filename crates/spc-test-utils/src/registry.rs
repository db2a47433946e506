//! [`TestRegistry`] builder for registry-backed test scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

/// A temporary registry laid out as `packages/` and `artifacts/`.
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::json;
/// use spc_test_utils::registry::TestRegistry;
///
/// let registry = TestRegistry::new();
/// registry.write_packages("lib.json", &json!({
///     "zlib": { "type": "library", "artifact": "zlib" }
/// }));
/// registry.write_artifacts("artifact.json", &json!({
///     "zlib": { "source": "https://zlib.net/zlib-1.3.1.tar.gz" }
/// }));
/// ```
pub struct TestRegistry {
    temp_dir: TempDir,
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRegistry {
    /// Create an empty registry with both sub-directories present.
    pub fn new() -> Self {
        let temp_dir = TempDir::new()
            .unwrap_or_else(|e| panic!("TestRegistry::new: failed to create temp dir: {e}"));
        for sub in ["packages", "artifacts"] {
            fs::create_dir_all(temp_dir.path().join(sub))
                .unwrap_or_else(|e| panic!("TestRegistry::new: failed to create {sub}/: {e}"));
        }
        Self { temp_dir }
    }

    /// Root of the registry.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root().join("packages")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root().join("artifacts")
    }

    /// Write a package file; the extension selects the format.
    pub fn write_packages(&self, file: &str, content: &Value) -> PathBuf {
        write_value(&self.packages_dir().join(file), content)
    }

    /// Write an artifact file; the extension selects the format.
    pub fn write_artifacts(&self, file: &str, content: &Value) -> PathBuf {
        write_value(&self.artifacts_dir().join(file), content)
    }

    /// Write raw text into the registry, for YAML/TOML or malformed input.
    pub fn write_raw(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("write_raw: failed to create {}: {e}", parent.display()));
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("write_raw: failed to write {}: {e}", path.display()));
        path
    }
}

fn write_value(path: &Path, content: &Value) -> PathBuf {
    let text = serde_json::to_string_pretty(content)
        .unwrap_or_else(|e| panic!("write_value: failed to serialize {}: {e}", path.display()));
    fs::write(path, text)
        .unwrap_or_else(|e| panic!("write_value: failed to write {}: {e}", path.display()));
    path.to_path_buf()
}
