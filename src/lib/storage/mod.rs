pub mod dummy_storage;
pub mod file;

pub use dummy_storage::*;
pub use file::*;

use async_trait::async_trait;

/// Source of the bearer token sent with every STOMP `CONNECT`.
///
/// `Ok(None)` means no token is stored; the client then skips the attempt.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_token(&self) -> anyhow::Result<Option<String>>;
}
