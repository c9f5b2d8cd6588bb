//! Saga controllers: one async function per state transition.
//!
//! Every controller loads its entity, checks the persisted state against the
//! expected pre-state, performs at most one gateway call, persists and returns
//! a [`Transition`] describing the events to publish. A state mismatch is not
//! an error: it means the message is a replay and yields
//! [`Transition::Ignored`].

use uuid::Uuid;

use crate::domain::{FailedRecord, SagaEntity};
use crate::error::SagaError;
use crate::events::OutboundEvent;
use crate::ports::EntityRepository;

mod context;
pub mod deposit;
pub mod devolution;
pub mod devolution_received;
pub mod failure;
pub mod fraud_detection;
pub mod infraction;
pub mod outbound;
pub mod payment;
pub mod refund;
pub mod resolve;
pub mod warning_deposit;
pub mod warning_devolution;

pub use context::{Gateways, OperationTags, Repositories, SagaContext, SagaSettings, SmsProviders};

/// Outcome of a controller invocation.
#[derive(Debug)]
pub enum Transition<E> {
    /// The entity moved to a new state.
    Applied { entity: E, events: Vec<OutboundEvent> },
    /// Nothing changed locally but follow-up events must be published.
    Emitted { entity_id: Uuid, events: Vec<OutboundEvent> },
    /// A collaborator failed; `events` carries the compensation path.
    Failed {
        entity_id: Uuid,
        failed: FailedRecord,
        events: Vec<OutboundEvent>,
    },
    /// The persisted state did not match; no side effect happened.
    Ignored { reason: String },
}

impl<E> Transition<E> {
    pub fn events(&self) -> &[OutboundEvent] {
        match self {
            Transition::Applied { events, .. }
            | Transition::Emitted { events, .. }
            | Transition::Failed { events, .. } => events,
            Transition::Ignored { .. } => &[],
        }
    }

    pub fn into_events(self) -> Vec<OutboundEvent> {
        match self {
            Transition::Applied { events, .. }
            | Transition::Emitted { events, .. }
            | Transition::Failed { events, .. } => events,
            Transition::Ignored { .. } => Vec::new(),
        }
    }

    pub fn entity(&self) -> Option<&E> {
        match self {
            Transition::Applied { entity, .. } => Some(entity),
            _ => None,
        }
    }

    pub fn failed(&self) -> Option<&FailedRecord> {
        match self {
            Transition::Failed { failed, .. } => Some(failed),
            _ => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Transition::Ignored { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::Applied { .. } => "applied",
            Transition::Emitted { .. } => "emitted",
            Transition::Failed { .. } => "failed",
            Transition::Ignored { .. } => "ignored",
        }
    }
}

pub type SagaResult<E> = Result<Transition<E>, SagaError>;

pub(crate) enum Guarded<E> {
    Ready(E),
    Skip(String),
}

/// Loads an entity and checks it is in one of the `expected` states.
pub(crate) async fn load_guarded<E: SagaEntity>(
    repository: &dyn EntityRepository<E>,
    id: Uuid,
    expected: &[E::State],
) -> Result<Guarded<E>, SagaError> {
    match repository.get_by_id(id).await? {
        None => Ok(Guarded::Skip(format!("{} {} not found", E::KIND, id))),
        Some(entity) if expected.contains(&entity.state()) => Ok(Guarded::Ready(entity)),
        Some(entity) => Ok(Guarded::Skip(format!(
            "{} {} is {}, expected one of {:?}",
            E::KIND,
            id,
            entity.state(),
            expected
        ))),
    }
}

/// Unwraps a [`Guarded`] load or returns `Transition::Ignored` from the
/// enclosing controller.
macro_rules! guarded {
    ($load:expr) => {
        match $load.await? {
            $crate::saga::Guarded::Ready(entity) => entity,
            $crate::saga::Guarded::Skip(reason) => {
                ::tracing::debug!(reason = %reason, "state guard skipped transition");
                return Ok($crate::saga::Transition::Ignored { reason });
            }
        }
    };
}

pub(crate) use guarded;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_transition_has_no_events() {
        let transition: Transition<()> = Transition::Ignored {
            reason: "replay".to_string(),
        };
        assert!(transition.is_ignored());
        assert!(transition.events().is_empty());
        assert!(transition.into_events().is_empty());
    }

    #[test]
    fn test_failed_transition_exposes_record() {
        let transition: Transition<()> = Transition::Failed {
            entity_id: Uuid::nil(),
            failed: FailedRecord::new("GATEWAY_TIMEOUT", "timeout"),
            events: vec![OutboundEvent::new("PAYMENT.REVERTED", "k", serde_json::json!({}))],
        };
        assert_eq!(transition.failed().map(|f| f.code.as_str()), Some("GATEWAY_TIMEOUT"));
        assert_eq!(transition.events().len(), 1);
        assert_eq!(transition.label(), "failed");
    }
}
