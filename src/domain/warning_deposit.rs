use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, SagaState, WarningReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningPixDepositState {
    Created,
    Checked,
    Approved,
    Rejected,
}

impl SagaState for WarningPixDepositState {
    const ALL: &'static [Self] = &[
        WarningPixDepositState::Created,
        WarningPixDepositState::Checked,
        WarningPixDepositState::Approved,
        WarningPixDepositState::Rejected,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            WarningPixDepositState::Created => "CREATED",
            WarningPixDepositState::Checked => "CHECKED",
            WarningPixDepositState::Approved => "APPROVED",
            WarningPixDepositState::Rejected => "REJECTED",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use WarningPixDepositState::*;
        matches!(
            (self, next),
            (Created, Checked) | (Checked, Approved) | (Checked, Rejected)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            WarningPixDepositState::Approved | WarningPixDepositState::Rejected
        )
    }
}

state_display!(WarningPixDepositState);

/// Hold placed on a deposit flagged by screening, pending compliance analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningPixDeposit {
    pub id: Uuid,
    pub deposit_id: Uuid,
    pub user_id: Uuid,
    pub reasons: Vec<WarningReason>,
    pub warning_transaction_id: Option<String>,
    pub state: WarningPixDepositState,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(WarningPixDeposit, WarningPixDepositState, "warning_pix_deposit");
