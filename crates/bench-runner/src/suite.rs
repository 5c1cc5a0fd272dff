//! Suite files on disk
//!
//! A suite is one YAML document:
//!
//! ```yaml
//! name: quick
//! description: Short prompts for smoke benchmarking
//! scenarios:
//!   - name: greeting
//!     prompt: "Hello! How are you?"
//!     max_tokens: 50
//! ```

use bench_core::types::Suite;
use bench_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only library of suites in one directory
#[derive(Debug, Clone)]
pub struct SuiteLibrary {
    dir: PathBuf,
}

impl SuiteLibrary {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All suites in the directory, sorted by name.
    ///
    /// Directory and file I/O problems surface as errors; a malformed suite
    /// file is an error too, so broken edits are noticed instead of silently
    /// shrinking the list.
    pub async fn list(&self) -> Result<Vec<Suite>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut suites = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            debug!("loading suite file {}", path.display());
            let text = tokio::fs::read_to_string(&path).await?;
            let suite: Suite = serde_yaml::from_str(&text)?;
            suites.push(suite);
        }

        suites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suites)
    }

    /// A suite by name
    pub async fn get(&self, name: &str) -> Result<Suite> {
        self.list()
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::not_found(format!("suite {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_suite(dir: &TempDir, file: &str, body: &str) {
        tokio::fs::write(dir.path().join(file), body).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let dir = TempDir::new().unwrap();
        write_suite(
            &dir,
            "quick.yaml",
            "name: quick\ndescription: smoke\nscenarios:\n  - name: greeting\n    prompt: Hi\n",
        )
        .await;
        write_suite(
            &dir,
            "long.yml",
            "name: long\nscenarios:\n  - name: essay\n    prompt: Write an essay\n    max_tokens: 500\n",
        )
        .await;
        // Non-YAML files are ignored
        write_suite(&dir, "notes.txt", "not a suite").await;

        let library = SuiteLibrary::new(dir.path());
        let suites = library.list().await.unwrap();
        assert_eq!(suites.len(), 2);
        assert_eq!(suites[0].name, "long");
        assert_eq!(suites[1].name, "quick");

        let quick = library.get("quick").await.unwrap();
        assert_eq!(quick.scenarios.len(), 1);
        assert_eq!(quick.scenarios[0].max_tokens, 100);

        let long = library.get("long").await.unwrap();
        assert_eq!(long.scenarios[0].max_tokens, 500);
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let library = SuiteLibrary::new("/nonexistent/suites");
        let err = library.list().await.unwrap_err();
        assert_eq!(err.category(), "io");
    }

    #[tokio::test]
    async fn test_unknown_suite_not_found() {
        let dir = TempDir::new().unwrap();
        let library = SuiteLibrary::new(dir.path());
        assert!(library.get("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_suite_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_suite(&dir, "broken.yaml", "name: [unclosed").await;

        let library = SuiteLibrary::new(dir.path());
        let err = library.list().await.unwrap_err();
        assert_eq!(err.category(), "yaml");
    }
}
