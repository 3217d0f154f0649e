use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

use crate::domain::{Session, SessionStorage};

// Process-local session storage. Nothing survives a restart.
#[derive(Default)]
pub struct InMemorySessionStorage {
    session: Mutex<Option<Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn load(&self) -> Result<Option<Session>, String> {
        let guard = self
            .session
            .lock()
            .map_err(|_| "session mutex poisoned".to_string())?;
        Ok(guard.clone())
    }

    async fn save(&self, session: &Session) -> Result<(), String> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| "session mutex poisoned".to_string())?;
        *guard = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), String> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| "session mutex poisoned".to_string())?;
        *guard = None;
        Ok(())
    }
}

// Session persisted as a JSON file.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

// Session files hold tokens; keep them owner-only where the platform allows.
async fn write_private(path: &Path, raw: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(raw).await?;
    file.sync_all().await
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load(&self) -> Result<Option<Session>, String> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {e}", self.path.display())),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| format!("corrupted session file {}: {e}", self.path.display()))
    }

    async fn save(&self, session: &Session) -> Result<(), String> {
        let raw = serde_json::to_vec_pretty(session)
            .map_err(|e| format!("failed to encode session: {e}"))?;

        // Write a sibling file and rename it over the target so readers never see a partial write.
        let tmp_path = self.tmp_path();
        write_private(&tmp_path, &raw)
            .await
            .map_err(|e| format!("failed to write {}: {e}", tmp_path.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(format!("failed to replace {}: {e}", self.path.display()));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), String> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("failed to remove {}: {e}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use uuid::Uuid;

    fn sample_session() -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_at: 1_700_000_000,
            user: User {
                id: Uuid::new_v4(),
                email: Some("pilot@example.com".to_string()),
            },
        }
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("session-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn when_file_is_missing_then_load_returns_none() {
        let storage = FileSessionStorage::new(temp_path());

        let loaded = storage.load().await.expect("expected load to succeed");

        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn when_session_is_saved_then_load_returns_it() {
        let path = temp_path();
        let storage = FileSessionStorage::new(&path);
        let session = sample_session();

        storage.save(&session).await.expect("expected save to succeed");
        let loaded = storage.load().await.expect("expected load to succeed");
        storage.clear().await.expect("expected clear to succeed");

        assert_eq!(loaded, Some(session));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn when_session_is_saved_over_corrupted_file_then_it_is_replaced_cleanly() {
        let path = temp_path();
        tokio::fs::write(&path, b"{ partial")
            .await
            .expect("expected write to succeed");
        let storage = FileSessionStorage::new(&path);
        let session = sample_session();

        storage.save(&session).await.expect("expected save to succeed");
        let loaded = storage.load().await.expect("expected load to succeed");
        let tmp_left = storage.tmp_path().exists();
        storage.clear().await.expect("expected clear to succeed");

        assert_eq!(loaded, Some(session));
        assert!(!tmp_left);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn when_session_is_saved_then_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path();
        let storage = FileSessionStorage::new(&path);

        storage
            .save(&sample_session())
            .await
            .expect("expected save to succeed");
        let mode = std::fs::metadata(&path)
            .expect("expected metadata")
            .permissions()
            .mode();
        storage.clear().await.expect("expected clear to succeed");

        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn when_file_is_corrupted_then_load_fails() {
        let path = temp_path();
        tokio::fs::write(&path, b"not json")
            .await
            .expect("expected write to succeed");
        let storage = FileSessionStorage::new(&path);

        let result = storage.load().await;
        let _ = tokio::fs::remove_file(&path).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn when_memory_storage_is_cleared_then_load_returns_none() {
        let storage = InMemorySessionStorage::with_session(sample_session());

        storage.clear().await.expect("expected clear to succeed");

        assert_eq!(storage.load().await.expect("expected load"), None);
    }
}
