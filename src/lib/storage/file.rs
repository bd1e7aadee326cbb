use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;

use super::TokenStore;

/// Reads the access token persisted by the login flow. The file is re-read on
/// every connect attempt, so a refreshed token is picked up on reconnect.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load_token(&self) -> anyhow::Result<Option<String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read token file {}", self.path.display()));
            }
        };
        let token = raw.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{name}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn trims_stored_token() {
        let path = temp_path("token");
        tokio::fs::write(&path, "  abc.def.ghi\n").await.unwrap();
        let store = FileTokenStore::new(&path);
        assert_eq!(store.load_token().await.unwrap().as_deref(), Some("abc.def.ghi"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_or_blank_file_means_no_token() {
        let path = temp_path("missing");
        assert_eq!(FileTokenStore::new(&path).load_token().await.unwrap(), None);

        tokio::fs::write(&path, "\n").await.unwrap();
        assert_eq!(FileTokenStore::new(&path).load_token().await.unwrap(), None);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        let dir = std::env::temp_dir();
        assert!(FileTokenStore::new(dir).load_token().await.is_err());
    }
}
