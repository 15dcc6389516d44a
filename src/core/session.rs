use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One live page in a remote browser, driven over its wire protocol.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Loads `url` and returns once the navigation has committed.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluates `script` in the page and returns its JSON result.
    async fn execute_script(&self, script: &str) -> Result<Value>;

    async fn current_url(&self) -> Result<String>;

    /// Releases the session. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}
