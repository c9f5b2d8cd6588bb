use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, SagaState, TransactionRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixRefundState {
    ReceivePending,
    ReceiveConfirmed,
    ClosePending,
    CloseConfirmed,
    CancelPending,
    CancelConfirmed,
    Error,
}

impl SagaState for PixRefundState {
    const ALL: &'static [Self] = &[
        PixRefundState::ReceivePending,
        PixRefundState::ReceiveConfirmed,
        PixRefundState::ClosePending,
        PixRefundState::CloseConfirmed,
        PixRefundState::CancelPending,
        PixRefundState::CancelConfirmed,
        PixRefundState::Error,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PixRefundState::ReceivePending => "RECEIVE_PENDING",
            PixRefundState::ReceiveConfirmed => "RECEIVE_CONFIRMED",
            PixRefundState::ClosePending => "CLOSE_PENDING",
            PixRefundState::CloseConfirmed => "CLOSE_CONFIRMED",
            PixRefundState::CancelPending => "CANCEL_PENDING",
            PixRefundState::CancelConfirmed => "CANCEL_CONFIRMED",
            PixRefundState::Error => "ERROR",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PixRefundState::*;
        matches!(
            (self, next),
            (ReceivePending, ReceiveConfirmed)
                | (ReceivePending, Error)
                | (ReceiveConfirmed, ClosePending)
                | (ReceiveConfirmed, CancelPending)
                | (ClosePending, CloseConfirmed)
                | (ClosePending, Error)
                | (CancelPending, CancelConfirmed)
                | (CancelPending, Error)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PixRefundState::CloseConfirmed | PixRefundState::CancelConfirmed | PixRefundState::Error
        )
    }
}

state_display!(PixRefundState);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixRefundStatus {
    Open,
    Closed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixRefundReason {
    Fraud,
    OperationFlaw,
    RefundCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixRefundRejectionReason {
    NoBalance,
    AccountClosure,
    CannotRefund,
    Other,
}

/// Refund request received from the scheme against one of our credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixRefund {
    pub id: Uuid,
    pub refund_psp_id: String,
    pub infraction_id: Option<Uuid>,
    pub refund_devolution_id: Option<Uuid>,
    pub transaction: TransactionRef,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: PixRefundReason,
    pub requester_ispb: Option<String>,
    pub issue_id: Option<String>,
    pub analysis_details: Option<String>,
    pub rejection_reason: Option<PixRefundRejectionReason>,
    pub status: PixRefundStatus,
    pub state: PixRefundState,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(PixRefund, PixRefundState, "pix_refund");

impl PixRefund {
    /// A refund devolution may only be sent within `interval_days` of the
    /// refund's creation. A window ending past the representable range is open.
    pub fn can_create_refund_devolution(&self, interval_days: i64, now: DateTime<Utc>) -> bool {
        if interval_days <= 0 {
            return false;
        }
        match Duration::try_days(interval_days).and_then(|window| self.created_at.checked_add_signed(window)) {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}
