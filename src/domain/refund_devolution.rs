use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::saga_entity;
use super::transfer::transfer_state;
use super::{FailedRecord, OperationRef, TransactionRef};

transfer_state!(
    /// Lifecycle of the devolution sent to honour an accepted refund request.
    PixRefundDevolutionState
);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixRefundDevolution {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refund_id: Uuid,
    pub transaction: TransactionRef,
    pub state: PixRefundDevolutionState,
    pub amount: i64,
    pub original_end_to_end_id: String,
    pub end_to_end_id: Option<String>,
    pub external_id: Option<String>,
    pub chargeback_reason: Option<String>,
    pub operation: Option<OperationRef>,
    pub failed: Option<FailedRecord>,
    /// Set once the ledger operation has been given back.
    #[serde(default)]
    pub reverted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(
    PixRefundDevolution,
    PixRefundDevolutionState,
    "pix_refund_devolution"
);
