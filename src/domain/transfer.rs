//! Shared lifecycle of outbound Pix transfers (payments and every kind of
//! devolution we send).

use super::SagaState;

/// Named phases of an outbound transfer. Each entity keeps its own state enum;
/// this trait only tells the generic saga which variant plays which role.
pub trait TransferState: SagaState {
    const PENDING: Self;
    const WAITING: Self;
    const CONFIRMED: Self;
    const FAILED: Self;
    const DEAD_LETTER: Self;
}

/// Declares a devolution-style state enum: Pending, Waiting, Confirmed,
/// Failed, DeadLetter with the canonical transition graph.
macro_rules! transfer_state {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            Pending,
            Waiting,
            Confirmed,
            Failed,
            DeadLetter,
        }

        impl $crate::domain::SagaState for $name {
            const ALL: &'static [Self] = &[
                $name::Pending,
                $name::Waiting,
                $name::Confirmed,
                $name::Failed,
                $name::DeadLetter,
            ];

            fn as_str(&self) -> &'static str {
                match self {
                    $name::Pending => "PENDING",
                    $name::Waiting => "WAITING",
                    $name::Confirmed => "CONFIRMED",
                    $name::Failed => "FAILED",
                    $name::DeadLetter => "DEAD_LETTER",
                }
            }

            fn can_transition_to(&self, next: Self) -> bool {
                use $name::*;
                matches!(
                    (self, next),
                    (Pending, Waiting)
                        | (Pending, Failed)
                        | (Pending, DeadLetter)
                        | (Waiting, Confirmed)
                        | (Waiting, Failed)
                        | (Waiting, DeadLetter)
                        | (Failed, DeadLetter)
                )
            }

            /// Failed only leaves for DeadLetter, when its ledger revert fails.
            fn is_terminal(&self) -> bool {
                matches!(self, $name::Confirmed | $name::Failed | $name::DeadLetter)
            }
        }

        impl $crate::domain::TransferState for $name {
            const PENDING: Self = $name::Pending;
            const WAITING: Self = $name::Waiting;
            const CONFIRMED: Self = $name::Confirmed;
            const FAILED: Self = $name::Failed;
            const DEAD_LETTER: Self = $name::DeadLetter;
        }

        $crate::domain::state_display!($name);
    };
}

pub(crate) use transfer_state;
