use async_trait::async_trait;

use crate::error::EmitError;
use crate::events::EventEnvelope;

#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), EmitError>;
}
