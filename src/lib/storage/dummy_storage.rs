use async_trait::async_trait;
use anyhow::Result;

use super::TokenStore;

/// Never has a token.
pub struct NoToken;

#[async_trait]
impl TokenStore for NoToken {
    async fn load_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A token held in memory.
pub struct StaticToken(pub String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenStore for StaticToken {
    async fn load_token(&self) -> Result<Option<String>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.0.clone()))
    }
}
