use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{IssueStore, StoreContents, StoreError};
use crate::issue::Issue;
use crate::notification::ChangelogRecord;

/// Store backed by a single JSON document on disk.
///
/// A missing file reads as an empty store. Writes within one process are
/// serialised; the file is rewritten whole on every save.
#[derive(Debug)]
pub struct JsonFileIssueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileIssueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoreContents, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(StoreContents::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreContents::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, contents: &StoreContents) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(contents)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl IssueStore for JsonFileIssueStore {
    async fn load_open_issues(&self, component_key: &str) -> Result<Vec<Issue>, StoreError> {
        Ok(self.read().await?.open_issues(component_key))
    }

    async fn load_issue(&self, issue_key: &str) -> Result<Option<Issue>, StoreError> {
        Ok(self.read().await?.issue(issue_key))
    }

    #[instrument(skip_all, fields(path = %self.path.display(), issues = issues.len()))]
    async fn save(&self, issues: &[Issue], changelog: &[ChangelogRecord]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.read().await?;
        contents.upsert(issues, changelog);
        self.write(&contents).await?;
        debug!(total = contents.issues.len(), "issue store written");
        Ok(())
    }

    async fn changelog(&self, issue_key: &str) -> Result<Vec<ChangelogRecord>, StoreError> {
        Ok(self.read().await?.changelog_of(issue_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::test_support::open_issue;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("issue-tracker-{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let store = JsonFileIssueStore::new(temp_path("missing"));
        assert!(store.load_open_issues("src/main.rs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let store = JsonFileIssueStore::new(&path);
        store.save(&[open_issue("A")], &[]).await.unwrap();

        let reopened = JsonFileIssueStore::new(&path);
        let loaded = reopened.load_issue("A").await.unwrap().unwrap();
        assert_eq!(loaded.rule_key.to_string(), "rust:S100");
        assert_eq!(loaded.line, Some(10));
        assert!(!loaded.is_changed());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let store = JsonFileIssueStore::new(&path);
        let err = store.load_issue("A").await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
