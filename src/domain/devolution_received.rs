use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, OperationRef, PixAccount, SagaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixDevolutionReceivedState {
    Ready,
    Received,
    Error,
}

impl SagaState for PixDevolutionReceivedState {
    const ALL: &'static [Self] = &[
        PixDevolutionReceivedState::Ready,
        PixDevolutionReceivedState::Received,
        PixDevolutionReceivedState::Error,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PixDevolutionReceivedState::Ready => "READY",
            PixDevolutionReceivedState::Received => "RECEIVED",
            PixDevolutionReceivedState::Error => "ERROR",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PixDevolutionReceivedState::*;
        matches!((self, next), (Ready, Received) | (Ready, Error))
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, PixDevolutionReceivedState::Ready)
    }
}

state_display!(PixDevolutionReceivedState);

/// A devolution the scheme delivered to us, returning (part of) a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixDevolutionReceived {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_id: Uuid,
    pub state: PixDevolutionReceivedState,
    pub amount: i64,
    pub end_to_end_id: String,
    pub original_end_to_end_id: String,
    pub third_part: Option<PixAccount>,
    pub reason: Option<String>,
    pub operation: Option<OperationRef>,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(
    PixDevolutionReceived,
    PixDevolutionReceivedState,
    "pix_devolution_received"
);
