//! State-machine discipline shared by every saga entity.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;

/// A state enum with a fixed directed transition graph.
pub trait SagaState:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// Persisted representation, identical to the serde representation.
    fn as_str(&self) -> &'static str;

    fn can_transition_to(&self, next: Self) -> bool;

    fn is_terminal(&self) -> bool;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.as_str() == value)
    }
}

/// An entity driven by a saga. Entities are never deleted, only moved to a
/// terminal state.
pub trait SagaEntity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type State: SagaState;

    /// Discriminator used by persistence adapters.
    const KIND: &'static str;

    fn id(&self) -> Uuid;

    fn state(&self) -> Self::State;

    /// Raw state assignment. Prefer [`SagaEntity::transition`].
    fn set_state(&mut self, state: Self::State);

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    fn touch(&mut self);

    /// Moves the entity along its transition table.
    fn transition(&mut self, next: Self::State) -> Result<(), DomainError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: Self::KIND,
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.set_state(next);
        self.touch();
        Ok(())
    }
}

/// Implements `SagaEntity` for a struct carrying the usual
/// `id`/`state`/`created_at`/`updated_at` fields.
macro_rules! saga_entity {
    ($entity:ty, $state:ty, $kind:literal) => {
        impl $crate::domain::SagaEntity for $entity {
            type State = $state;
            const KIND: &'static str = $kind;

            fn id(&self) -> ::uuid::Uuid {
                self.id
            }

            fn state(&self) -> $state {
                self.state
            }

            fn set_state(&mut self, state: $state) {
                self.state = state;
            }

            fn created_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.created_at
            }

            fn updated_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.updated_at
            }

            fn touch(&mut self) {
                self.updated_at = ::chrono::Utc::now();
            }
        }
    };
}

/// `Display` for state enums, delegating to `SagaState::as_str`.
macro_rules! state_display {
    ($($state:ty),+ $(,)?) => {
        $(
            impl ::std::fmt::Display for $state {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    f.write_str($crate::domain::SagaState::as_str(self))
                }
            }
        )+
    };
}

pub(crate) use saga_entity;
pub(crate) use state_display;
