use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{OperationRef, SagaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixInfractionRefundOperationState {
    Open,
    Closed,
    Canceled,
}

impl SagaState for PixInfractionRefundOperationState {
    const ALL: &'static [Self] = &[
        PixInfractionRefundOperationState::Open,
        PixInfractionRefundOperationState::Closed,
        PixInfractionRefundOperationState::Canceled,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PixInfractionRefundOperationState::Open => "OPEN",
            PixInfractionRefundOperationState::Closed => "CLOSED",
            PixInfractionRefundOperationState::Canceled => "CANCELED",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PixInfractionRefundOperationState::*;
        matches!((self, next), (Open, Closed) | (Open, Canceled))
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, PixInfractionRefundOperationState::Open)
    }
}

state_display!(PixInfractionRefundOperationState);

/// Double-entry link between the original credit and the refund debit.
/// Fields are private so only `state` can change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixInfractionRefundOperation {
    id: Uuid,
    user_id: Uuid,
    refund_id: Uuid,
    infraction_id: Option<Uuid>,
    original_operation: OperationRef,
    refund_operation: OperationRef,
    state: PixInfractionRefundOperationState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

saga_entity!(
    PixInfractionRefundOperation,
    PixInfractionRefundOperationState,
    "pix_infraction_refund_operation"
);

impl PixInfractionRefundOperation {
    pub fn new(
        user_id: Uuid,
        refund_id: Uuid,
        infraction_id: Option<Uuid>,
        original_operation: OperationRef,
        refund_operation: OperationRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            refund_id,
            infraction_id,
            original_operation,
            refund_operation,
            state: PixInfractionRefundOperationState::Open,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn refund_id(&self) -> Uuid {
        self.refund_id
    }

    pub fn infraction_id(&self) -> Option<Uuid> {
        self.infraction_id
    }

    pub fn original_operation(&self) -> OperationRef {
        self.original_operation
    }

    pub fn refund_operation(&self) -> OperationRef {
        self.refund_operation
    }
}
