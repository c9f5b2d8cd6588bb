use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, SagaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixFraudDetectionState {
    RegisterPending,
    RegisterConfirmed,
    CancelRegisteredPending,
    CancelRegisteredConfirmed,
    ReceivedPending,
    ReceivedConfirmed,
    CancelReceivedPending,
    CancelReceivedConfirmed,
    Failed,
}

impl SagaState for PixFraudDetectionState {
    const ALL: &'static [Self] = &[
        PixFraudDetectionState::RegisterPending,
        PixFraudDetectionState::RegisterConfirmed,
        PixFraudDetectionState::CancelRegisteredPending,
        PixFraudDetectionState::CancelRegisteredConfirmed,
        PixFraudDetectionState::ReceivedPending,
        PixFraudDetectionState::ReceivedConfirmed,
        PixFraudDetectionState::CancelReceivedPending,
        PixFraudDetectionState::CancelReceivedConfirmed,
        PixFraudDetectionState::Failed,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PixFraudDetectionState::RegisterPending => "REGISTER_PENDING",
            PixFraudDetectionState::RegisterConfirmed => "REGISTER_CONFIRMED",
            PixFraudDetectionState::CancelRegisteredPending => "CANCEL_REGISTERED_PENDING",
            PixFraudDetectionState::CancelRegisteredConfirmed => "CANCEL_REGISTERED_CONFIRMED",
            PixFraudDetectionState::ReceivedPending => "RECEIVED_PENDING",
            PixFraudDetectionState::ReceivedConfirmed => "RECEIVED_CONFIRMED",
            PixFraudDetectionState::CancelReceivedPending => "CANCEL_RECEIVED_PENDING",
            PixFraudDetectionState::CancelReceivedConfirmed => "CANCEL_RECEIVED_CONFIRMED",
            PixFraudDetectionState::Failed => "FAILED",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PixFraudDetectionState::*;
        matches!(
            (self, next),
            (RegisterPending, RegisterConfirmed)
                | (RegisterPending, Failed)
                | (RegisterConfirmed, CancelRegisteredPending)
                | (CancelRegisteredPending, CancelRegisteredConfirmed)
                | (CancelRegisteredPending, Failed)
                | (ReceivedPending, ReceivedConfirmed)
                | (ReceivedPending, Failed)
                | (ReceivedConfirmed, CancelReceivedPending)
                | (CancelReceivedPending, CancelReceivedConfirmed)
                | (CancelReceivedPending, Failed)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PixFraudDetectionState::CancelRegisteredConfirmed
                | PixFraudDetectionState::CancelReceivedConfirmed
                | PixFraudDetectionState::Failed
        )
    }
}

state_display!(PixFraudDetectionState);

/// Scheme-side status of the fraud marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixFraudDetectionStatus {
    Registered,
    CanceledRegistered,
    Received,
    CanceledReceived,
}

impl PixFraudDetectionStatus {
    /// Status that must accompany a confirmed state. Pending states keep
    /// whatever status the entity already had.
    pub fn for_state(state: PixFraudDetectionState) -> Option<Self> {
        match state {
            PixFraudDetectionState::RegisterConfirmed => Some(Self::Registered),
            PixFraudDetectionState::CancelRegisteredConfirmed => Some(Self::CanceledRegistered),
            PixFraudDetectionState::ReceivedConfirmed => Some(Self::Received),
            PixFraudDetectionState::CancelReceivedConfirmed => Some(Self::CanceledReceived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersonType {
    NaturalPerson,
    LegalPerson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudType {
    FalseIdentification,
    DummyAccount,
    FraudsterAccount,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixFraudDetection {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub issue_id: Option<String>,
    pub person_type: PersonType,
    pub document: String,
    pub fraud_type: FraudType,
    pub key: Option<String>,
    pub status: Option<PixFraudDetectionStatus>,
    pub state: PixFraudDetectionState,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(PixFraudDetection, PixFraudDetectionState, "pix_fraud_detection");

impl PixFraudDetection {
    /// Moves state and, for confirmed states, the scheme status together.
    pub fn confirm(&mut self, next: PixFraudDetectionState) -> Result<(), crate::error::DomainError> {
        crate::domain::SagaEntity::transition(self, next)?;
        if let Some(status) = PixFraudDetectionStatus::for_state(next) {
            self.status = Some(status);
        }
        Ok(())
    }

    pub fn same_subject(&self, person_type: PersonType, document: &str, fraud_type: FraudType) -> bool {
        self.person_type == person_type && self.document == document && self.fraud_type == fraud_type
    }

    /// Status agrees with the last confirmed state.
    pub fn is_in_sync(&self) -> bool {
        match PixFraudDetectionStatus::for_state(self.state) {
            Some(expected) => self.status == Some(expected),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(state: PixFraudDetectionState) -> PixFraudDetection {
        let now = Utc::now();
        PixFraudDetection {
            id: Uuid::new_v4(),
            external_id: None,
            issue_id: Some("ISSUE-1".to_string()),
            person_type: PersonType::NaturalPerson,
            document: "12345678909".to_string(),
            fraud_type: FraudType::FraudsterAccount,
            key: None,
            status: None,
            state,
            failed: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_confirm_keeps_status_in_sync() {
        let mut fraud = detection(PixFraudDetectionState::RegisterPending);
        fraud.confirm(PixFraudDetectionState::RegisterConfirmed).unwrap();
        assert_eq!(fraud.status, Some(PixFraudDetectionStatus::Registered));
        assert!(fraud.is_in_sync());

        fraud.confirm(PixFraudDetectionState::CancelRegisteredPending).unwrap();
        assert_eq!(fraud.status, Some(PixFraudDetectionStatus::Registered));
        fraud.confirm(PixFraudDetectionState::CancelRegisteredConfirmed).unwrap();
        assert_eq!(fraud.status, Some(PixFraudDetectionStatus::CanceledRegistered));
    }

    #[test]
    fn test_register_cannot_jump_to_received() {
        let mut fraud = detection(PixFraudDetectionState::RegisterPending);
        assert!(fraud.confirm(PixFraudDetectionState::ReceivedConfirmed).is_err());
        assert_eq!(fraud.status, None);
    }
}
