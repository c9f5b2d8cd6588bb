use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, OperationRef, PixAccount, SagaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixDepositState {
    New,
    Waiting,
    Received,
    Blocked,
    Error,
}

impl SagaState for PixDepositState {
    const ALL: &'static [Self] = &[
        PixDepositState::New,
        PixDepositState::Waiting,
        PixDepositState::Received,
        PixDepositState::Blocked,
        PixDepositState::Error,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PixDepositState::New => "NEW",
            PixDepositState::Waiting => "WAITING",
            PixDepositState::Received => "RECEIVED",
            PixDepositState::Blocked => "BLOCKED",
            PixDepositState::Error => "ERROR",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PixDepositState::*;
        matches!(
            (self, next),
            (New, Received)
                | (New, Waiting)
                | (New, Error)
                | (Waiting, Received)
                | (Waiting, Blocked)
                | (Waiting, Error)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PixDepositState::Received | PixDepositState::Blocked | PixDepositState::Error
        )
    }
}

state_display!(PixDepositState);

/// Why the screening pipeline held a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningReason {
    Duplicated,
    BlockedDocument,
    SuspectBank,
    GovernmentEntity,
    OverIncome,
    InstitutionRule,
}

/// Inbound Pix credit to one of our users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixDeposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub state: PixDepositState,
    pub amount: i64,
    pub end_to_end_id: String,
    pub txid: Option<String>,
    pub client: PixAccount,
    pub third_part: PixAccount,
    pub description: Option<String>,
    pub is_duplicated: bool,
    pub warning_reasons: Vec<WarningReason>,
    pub operation: Option<OperationRef>,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(PixDeposit, PixDepositState, "pix_deposit");

impl PixDeposit {
    pub fn is_credited(&self) -> bool {
        self.state == PixDepositState::Received
    }
}
