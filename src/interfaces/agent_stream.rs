use futures::stream::BoxStream;

use crate::domains::agent::AgentReference;
use crate::error::Result;

/// The only thing the relay needs from the hosted agent: given one prompt,
/// an ordered stream of text fragments.
pub trait AgentStream: Send + Sync {
    fn stream_prompt(
        &self,
        agent: &AgentReference,
        prompt: &str,
    ) -> BoxStream<'static, Result<String>>;
}
