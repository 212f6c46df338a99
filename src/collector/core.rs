//! Core collector traits
use super::metric::Reading;
use crate::error::Result;

/// An upstream data source polled once per tick.
///
/// Stateless sources only implement [`Source::fetch`]. Sources that need a
/// session establish it in [`Source::open`] and release it in
/// [`Source::close`]; the collector loop calls each at most once.
///
/// Errors returned from `fetch` are classified with
/// [`AgentError::is_soft`](crate::error::AgentError::is_soft): soft errors
/// degrade the tick to absent values, anything else stops the agent.
#[async_trait::async_trait]
pub trait Source: Send + 'static {
    /// Get the source name, including its identifier
    fn name(&self) -> &str;

    /// Establish the session
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fetch one value per key, in key order
    async fn fetch(&mut self, keys: &[String]) -> Result<Reading>;

    /// Release the session
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
