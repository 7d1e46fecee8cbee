use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domains::message::ChatRequest;
use crate::error::Result;

/// Client side of the relay: opens one streamed turn.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: ChatRequest) -> Result<BoxStream<'static, Result<Bytes>>>;
}
