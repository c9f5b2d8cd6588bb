use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, OperationRef, PixAccount, SagaState, TransferState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Scheduled,
    Pending,
    Waiting,
    Confirmed,
    Failed,
    Canceled,
    DeadLetter,
}

impl SagaState for PaymentState {
    const ALL: &'static [Self] = &[
        PaymentState::Scheduled,
        PaymentState::Pending,
        PaymentState::Waiting,
        PaymentState::Confirmed,
        PaymentState::Failed,
        PaymentState::Canceled,
        PaymentState::DeadLetter,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Scheduled => "SCHEDULED",
            PaymentState::Pending => "PENDING",
            PaymentState::Waiting => "WAITING",
            PaymentState::Confirmed => "CONFIRMED",
            PaymentState::Failed => "FAILED",
            PaymentState::Canceled => "CANCELED",
            PaymentState::DeadLetter => "DEAD_LETTER",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PaymentState::*;
        matches!(
            (self, next),
            (Scheduled, Pending)
                | (Scheduled, Canceled)
                | (Pending, Waiting)
                | (Pending, Failed)
                | (Pending, Canceled)
                | (Pending, DeadLetter)
                | (Waiting, Confirmed)
                | (Waiting, Failed)
                | (Waiting, Canceled)
                | (Waiting, DeadLetter)
                | (Failed, DeadLetter)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Confirmed
                | PaymentState::Failed
                | PaymentState::Canceled
                | PaymentState::DeadLetter
        )
    }
}

impl TransferState for PaymentState {
    const PENDING: Self = PaymentState::Pending;
    const WAITING: Self = PaymentState::Waiting;
    const CONFIRMED: Self = PaymentState::Confirmed;
    const FAILED: Self = PaymentState::Failed;
    const DEAD_LETTER: Self = PaymentState::DeadLetter;
}

state_display!(PaymentState);

/// Outbound Pix debit from one of our users to a beneficiary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub state: PaymentState,
    pub value: i64,
    pub beneficiary: PixAccount,
    pub description: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub operation: Option<OperationRef>,
    pub end_to_end_id: Option<String>,
    pub external_id: Option<String>,
    pub chargeback_reason: Option<String>,
    pub failed: Option<FailedRecord>,
    /// Set once the ledger operation has been given back.
    #[serde(default)]
    pub reverted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(Payment, PaymentState, "payment");

impl Payment {
    pub fn new(
        id: Uuid,
        user_id: Uuid,
        value: i64,
        beneficiary: PixAccount,
        description: Option<String>,
        payment_date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        let state = match payment_date {
            Some(date) if date > now => PaymentState::Scheduled,
            _ => PaymentState::Pending,
        };
        Self {
            id,
            user_id,
            state,
            value,
            beneficiary,
            description,
            payment_date,
            operation: None,
            end_to_end_id: None,
            external_id: None,
            chargeback_reason: None,
            failed: None,
            reverted_at: None,
            confirmed_at: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.payment_date.map_or(true, |date| date <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SagaEntity;
    use chrono::Duration;

    fn beneficiary() -> PixAccount {
        PixAccount {
            name: Some("Maria".to_string()),
            document: "12345678909".to_string(),
            ispb: "00000000".to_string(),
            branch: Some("0001".to_string()),
            account_number: "123456".to_string(),
        }
    }

    #[test]
    fn test_future_payment_is_scheduled() {
        let date = Utc::now() + Duration::days(2);
        let payment = Payment::new(Uuid::new_v4(), Uuid::new_v4(), 100, beneficiary(), None, Some(date));
        assert_eq!(payment.state, PaymentState::Scheduled);
        assert!(!payment.is_due(Utc::now()));
    }

    #[test]
    fn test_immediate_payment_is_pending() {
        let payment = Payment::new(Uuid::new_v4(), Uuid::new_v4(), 100, beneficiary(), None, None);
        assert_eq!(payment.state, PaymentState::Pending);
        assert!(payment.is_due(Utc::now()));
    }

    #[test]
    fn test_confirmed_payment_cannot_move_back() {
        let mut payment = Payment::new(Uuid::new_v4(), Uuid::new_v4(), 100, beneficiary(), None, None);
        payment.transition(PaymentState::Waiting).unwrap();
        payment.transition(PaymentState::Confirmed).unwrap();
        assert!(payment.state.is_terminal());
        assert!(payment.transition(PaymentState::Pending).is_err());
    }

    #[test]
    fn test_refused_payment_cannot_return_to_pending() {
        let mut payment = Payment::new(Uuid::new_v4(), Uuid::new_v4(), 100, beneficiary(), None, None);
        payment.transition(PaymentState::Failed).unwrap();
        assert!(payment.transition(PaymentState::Pending).is_err());
        assert!(payment.transition(PaymentState::Waiting).is_err());
        payment.transition(PaymentState::DeadLetter).unwrap();
    }

    #[test]
    fn test_state_round_trips_through_parse() {
        for state in PaymentState::ALL {
            assert_eq!(PaymentState::parse(state.as_str()), Some(*state));
        }
        assert_eq!(PaymentState::parse("UNKNOWN"), None);
    }
}
