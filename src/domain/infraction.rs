use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, SagaState, TransactionRef};

/// Local processing state of an infraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixInfractionState {
    NewConfirmed,
    OpenPending,
    OpenConfirmed,
    ReceivePending,
    ReceiveConfirmed,
    ClosePending,
    CloseConfirmed,
    CancelPending,
    CancelConfirmed,
    Error,
}

impl SagaState for PixInfractionState {
    const ALL: &'static [Self] = &[
        PixInfractionState::NewConfirmed,
        PixInfractionState::OpenPending,
        PixInfractionState::OpenConfirmed,
        PixInfractionState::ReceivePending,
        PixInfractionState::ReceiveConfirmed,
        PixInfractionState::ClosePending,
        PixInfractionState::CloseConfirmed,
        PixInfractionState::CancelPending,
        PixInfractionState::CancelConfirmed,
        PixInfractionState::Error,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PixInfractionState::NewConfirmed => "NEW_CONFIRMED",
            PixInfractionState::OpenPending => "OPEN_PENDING",
            PixInfractionState::OpenConfirmed => "OPEN_CONFIRMED",
            PixInfractionState::ReceivePending => "RECEIVE_PENDING",
            PixInfractionState::ReceiveConfirmed => "RECEIVE_CONFIRMED",
            PixInfractionState::ClosePending => "CLOSE_PENDING",
            PixInfractionState::CloseConfirmed => "CLOSE_CONFIRMED",
            PixInfractionState::CancelPending => "CANCEL_PENDING",
            PixInfractionState::CancelConfirmed => "CANCEL_CONFIRMED",
            PixInfractionState::Error => "ERROR",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PixInfractionState::*;
        matches!(
            (self, next),
            (NewConfirmed, OpenPending)
                | (NewConfirmed, CancelConfirmed)
                | (OpenPending, OpenConfirmed)
                | (OpenPending, Error)
                | (OpenConfirmed, CloseConfirmed)
                | (OpenConfirmed, CancelPending)
                | (ReceivePending, ReceiveConfirmed)
                | (ReceivePending, Error)
                | (ReceiveConfirmed, ClosePending)
                | (ClosePending, CloseConfirmed)
                | (ClosePending, Error)
                | (CancelPending, CancelConfirmed)
                | (CancelPending, Error)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PixInfractionState::CloseConfirmed
                | PixInfractionState::CancelConfirmed
                | PixInfractionState::Error
        )
    }
}

state_display!(PixInfractionState);

/// Scheme-side negotiation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixInfractionStatus {
    New,
    Open,
    Received,
    Closed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixInfractionType {
    Fraud,
    RequestRefund,
    CancelDevolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixInfractionAnalysisResult {
    Agreed,
    Disagreed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixInfraction {
    pub id: Uuid,
    pub issue_id: Option<String>,
    pub infraction_psp_id: Option<String>,
    pub infraction_type: PixInfractionType,
    pub transaction: TransactionRef,
    pub end_to_end_id: String,
    pub description: Option<String>,
    pub analysis_result: Option<PixInfractionAnalysisResult>,
    pub analysis_details: Option<String>,
    pub status: PixInfractionStatus,
    pub state: PixInfractionState,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(PixInfraction, PixInfractionState, "pix_infraction");

impl PixInfractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixInfractionStatus::New => "NEW",
            PixInfractionStatus::Open => "OPEN",
            PixInfractionStatus::Received => "RECEIVED",
            PixInfractionStatus::Closed => "CLOSED",
            PixInfractionStatus::Canceled => "CANCELED",
        }
    }
}
