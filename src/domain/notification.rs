use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{saga_entity, state_display};
use super::{FailedRecord, SagaState};

/// Delivery state shared by SMS and e-mail records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationState {
    Pending,
    Processing,
    Sent,
    Failed,
    DeadLetter,
}

impl SagaState for NotificationState {
    const ALL: &'static [Self] = &[
        NotificationState::Pending,
        NotificationState::Processing,
        NotificationState::Sent,
        NotificationState::Failed,
        NotificationState::DeadLetter,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            NotificationState::Pending => "PENDING",
            NotificationState::Processing => "PROCESSING",
            NotificationState::Sent => "SENT",
            NotificationState::Failed => "FAILED",
            NotificationState::DeadLetter => "DEAD_LETTER",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use NotificationState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, DeadLetter)
                | (Processing, Pending)
                | (Processing, Sent)
                | (Processing, Failed)
                | (Processing, DeadLetter)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotificationState::Sent | NotificationState::Failed | NotificationState::DeadLetter
        )
    }
}

state_display!(NotificationState);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sms {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub phone_number: String,
    pub body: String,
    pub idempotency_token: Option<String>,
    /// Providers in the order they will be tried for this record.
    pub route: Vec<String>,
    /// Index into `route` of the provider currently responsible.
    pub attempt: usize,
    pub state: NotificationState,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(Sms, NotificationState, "sms");

impl Sms {
    pub fn current_provider(&self) -> Option<&str> {
        self.route.get(self.attempt).map(String::as_str)
    }

    pub fn next_provider(&self) -> Option<&str> {
        self.route.get(self.attempt + 1).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub to: String,
    pub from: String,
    pub title: String,
    pub body: String,
    pub html: bool,
    pub attempts: u32,
    pub state: NotificationState,
    pub failed: Option<FailedRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

saga_entity!(Email, NotificationState, "email");
