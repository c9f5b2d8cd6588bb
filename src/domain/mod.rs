//! Saga entities and their state machines.

mod common;
mod deposit;
mod devolution;
mod devolution_received;
mod fraud_detection;
mod infraction;
mod infraction_refund_operation;
mod notification;
mod payment;
mod refund;
mod refund_devolution;
pub(crate) mod state;
pub(crate) mod transfer;
mod warning_deposit;
mod warning_devolution;

pub use common::{
    digits_only, FailedRecord, OperationRef, PixAccount, TransactionKind, TransactionRef,
};
pub use deposit::{PixDeposit, PixDepositState, WarningReason};
pub use devolution::{PixDevolution, PixDevolutionState};
pub use devolution_received::{PixDevolutionReceived, PixDevolutionReceivedState};
pub use fraud_detection::{
    FraudType, PersonType, PixFraudDetection, PixFraudDetectionState, PixFraudDetectionStatus,
};
pub use infraction::{
    PixInfraction, PixInfractionAnalysisResult, PixInfractionState, PixInfractionStatus,
    PixInfractionType,
};
pub use infraction_refund_operation::{
    PixInfractionRefundOperation, PixInfractionRefundOperationState,
};
pub use notification::{Email, NotificationState, Sms};
pub use payment::{Payment, PaymentState};
pub use refund::{
    PixRefund, PixRefundReason, PixRefundRejectionReason, PixRefundState, PixRefundStatus,
};
pub use refund_devolution::{PixRefundDevolution, PixRefundDevolutionState};
pub use state::{SagaEntity, SagaState};
pub(crate) use state::state_display;
pub use transfer::TransferState;
pub use warning_deposit::{WarningPixDeposit, WarningPixDepositState};
pub use warning_devolution::{WarningPixDevolution, WarningPixDevolutionState};
