use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::saga_entity;
use super::transfer::transfer_state;
use super::{FailedRecord, OperationRef};

transfer_state!(
    /// Lifecycle of a devolution we send back for a received deposit.
    PixDevolutionState
);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixDevolution {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deposit_id: Uuid,
    pub state: PixDevolutionState,
    pub amount: i64,
    pub description: Option<String>,
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

saga_entity!(PixDevolution, PixDevolutionState, "pix_devolution");

impl PixDevolution {
    /// Devolutions in these states no longer hold any part of the deposit.
    pub fn releases_amount(&self) -> bool {
        matches!(
            self.state,
            PixDevolutionState::Failed | PixDevolutionState::DeadLetter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SagaEntity, SagaState};

    #[test]
    fn test_devolution_transition_table() {
        use PixDevolutionState::*;
        assert!(Pending.can_transition_to(Waiting));
        assert!(Waiting.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Waiting.can_transition_to(DeadLetter));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Confirmed));
        assert!(Failed.can_transition_to(DeadLetter));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Waiting));
        assert!(Confirmed.is_terminal());
        assert!(!Waiting.is_terminal());
    }

    #[test]
    fn test_failed_devolution_releases_amount() {
        let now = Utc::now();
        let mut devolution = PixDevolution {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            deposit_id: Uuid::new_v4(),
            state: PixDevolutionState::Pending,
            amount: 500,
            description: None,
            original_end_to_end_id: "E123".to_string(),
            end_to_end_id: None,
            external_id: None,
            chargeback_reason: None,
            operation: None,
            failed: None,
            reverted_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!devolution.releases_amount());
        devolution.transition(PixDevolutionState::Failed).unwrap();
        assert!(devolution.releases_amount());
    }
}
