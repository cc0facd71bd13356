//! Session result persistence
//!
//! A session is created on submission, receives step results as they are
//! produced, and is never deleted automatically. Two stores are provided:
//! - [`InMemorySessionStore`]: process-local, the default
//! - [`FileSessionStore`]: one JSON document per session, survives restarts

use crate::error::SessionError;
use crate::types::{SessionId, StepResults};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attempts at drawing an unused session id
const CREATE_ATTEMPTS: usize = 16;

/// Stored form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id
    pub id: SessionId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Root-relative path of the submitted code, once it is stored
    #[serde(default)]
    pub artifact: Option<String>,
    /// Step outputs in step order
    pub results: StepResults,
}

impl SessionRecord {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            artifact: None,
            results: StepResults::new(),
        }
    }
}

/// Persistence of step results keyed by session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reserve a fresh session with an empty result mapping
    async fn create(&self) -> Result<SessionId, SessionError>;

    /// Remember where the session's code was stored
    async fn attach_artifact(&self, id: &SessionId, artifact: &str) -> Result<(), SessionError>;

    /// Replace the results of a session
    async fn save(&self, id: &SessionId, results: &StepResults) -> Result<(), SessionError>;

    /// Full stored record
    async fn record(&self, id: &SessionId) -> Result<SessionRecord, SessionError>;

    /// Results of a session
    async fn get(&self, id: &SessionId) -> Result<StepResults, SessionError> {
        self.record(id).await.map(|r| r.results)
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionRecord>,
}

impl InMemorySessionStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> Result<SessionId, SessionError> {
        for _ in 0..CREATE_ATTEMPTS {
            let id = SessionId::generate();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(SessionRecord::new(id.clone()));
                return Ok(id);
            }
        }
        Err(SessionError::Storage("could not allocate a session id".into()))
    }

    async fn attach_artifact(&self, id: &SessionId, artifact: &str) -> Result<(), SessionError> {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        record.artifact = Some(artifact.to_string());
        Ok(())
    }

    async fn save(&self, id: &SessionId, results: &StepResults) -> Result<(), SessionError> {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        record.results.clone_from(results);
        Ok(())
    }

    async fn record(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        self.sessions
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }
}

/// One JSON document per session in a directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open (and create) the store directory
    ///
    /// # Errors
    /// `Storage` when the directory cannot be created
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage(&dir, &e))?;
        Ok(Self { dir })
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let path = self.path_of(&record.id);
        let staging = self.dir.join(format!(".{}.{}.tmp", record.id, uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        if let Err(e) = tokio::fs::write(&staging, &bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(storage(&staging, &e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(storage(&path, &e));
        }
        Ok(())
    }
}

fn storage(path: &Path, err: &std::io::Error) -> SessionError {
    SessionError::Storage(format!("{}: {err}", path.display()))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self) -> Result<SessionId, SessionError> {
        for _ in 0..CREATE_ATTEMPTS {
            let id = SessionId::generate();
            let path = self.path_of(&id);
            // Claim the id atomically; the record is written over the claim.
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    self.write_record(&SessionRecord::new(id.clone())).await?;
                    tracing::debug!(session = %id, "session created");
                    return Ok(id);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(storage(&path, &e)),
            }
        }
        Err(SessionError::Storage("could not allocate a session id".into()))
    }

    async fn attach_artifact(&self, id: &SessionId, artifact: &str) -> Result<(), SessionError> {
        let mut record = self.record(id).await?;
        record.artifact = Some(artifact.to_string());
        self.write_record(&record).await
    }

    async fn save(&self, id: &SessionId, results: &StepResults) -> Result<(), SessionError> {
        let mut record = self.record(id).await?;
        record.results.clone_from(results);
        self.write_record(&record).await
    }

    async fn record(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        let path = self.path_of(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.clone()))
            }
            Err(e) => return Err(storage(&path, &e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::Storage(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepId;
    use pretty_assertions::assert_eq;

    fn results() -> StepResults {
        let mut results = StepResults::new();
        results.insert(StepId::Summarize, "Adds two numbers.".into());
        results.insert(StepId::Analyze, "- line 2: no type check".into());
        results
    }

    async fn round_trip(store: &dyn SessionStore) {
        let id = store.create().await.unwrap();
        assert!(store.get(&id).await.unwrap().is_empty());
        assert_eq!(store.record(&id).await.unwrap().artifact, None);

        let artifact = format!("{id}/snippet.py");
        store.attach_artifact(&id, &artifact).await.unwrap();
        store.save(&id, &results()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), results());
        assert_eq!(store.record(&id).await.unwrap().artifact, Some(artifact));

        store.save(&id, &results()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), results());

        let unknown: SessionId = "ffffffff".parse().unwrap();
        assert!(matches!(store.get(&unknown).await, Err(SessionError::NotFound(_))));
        assert!(matches!(
            store.save(&unknown, &results()).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            store.attach_artifact(&unknown, "ffffffff/x.py").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemorySessionStore::new();
        round_trip(&store).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions")).await.unwrap();
        round_trip(&store).await;
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileSessionStore::open(dir.path()).await.unwrap();
            let id = store.create().await.unwrap();
            store.attach_artifact(&id, &format!("{id}/snippet.py")).await.unwrap();
            store.save(&id, &results()).await.unwrap();
            id
        };

        let reopened = FileSessionStore::open(dir.path()).await.unwrap();
        let record = reopened.record(&id).await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.artifact, Some(format!("{id}/snippet.py")));
        assert_eq!(record.results, results());
        assert_eq!(
            record.results.keys().copied().collect::<Vec<_>>(),
            vec![StepId::Summarize, StepId::Analyze]
        );
    }

    #[tokio::test]
    async fn records_without_an_artifact_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        std::fs::write(
            dir.path().join("ab12cd34.json"),
            r#"{"id": "ab12cd34", "created_at": "2024-01-01T00:00:00Z", "results": {"summarize": "s"}}"#,
        )
        .unwrap();

        let id: SessionId = "ab12cd34".parse().unwrap();
        let record = store.record(&id).await.unwrap();
        assert_eq!(record.artifact, None);
        assert_eq!(record.results[&StepId::Summarize], "s");
    }

    #[tokio::test]
    async fn file_store_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        let id = store.create().await.unwrap();
        store.save(&id, &results()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{id}.json")]);
    }
}
