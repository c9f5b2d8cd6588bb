use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    FailedRecord, OperationRef, Payment, PaymentState, PixAccount, SagaEntity,
};
use crate::error::DomainError;
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, TransferKind, TransferOrder, TransferReceipt};
use crate::saga::failure::gateway_failure;
use crate::saga::outbound::{self, OutboundTransfer};
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub value: i64,
    pub beneficiary: PixAccount,
    pub description: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
}

impl OutboundTransfer for Payment {
    const DOMAIN: Domain = Domain::Payment;

    fn repository(ctx: &SagaContext) -> &dyn EntityRepository<Self> {
        ctx.repositories.payments.as_ref()
    }

    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn amount(&self) -> i64 {
        self.value
    }

    fn transfer_order(&self) -> TransferOrder {
        TransferOrder {
            id: self.id,
            kind: TransferKind::Payment,
            amount: self.value,
            description: self.description.clone(),
            beneficiary: Some(self.beneficiary.clone()),
            original_end_to_end_id: None,
        }
    }

    fn operation(&self) -> Option<OperationRef> {
        self.operation
    }

    fn set_operation(&mut self, operation: OperationRef) {
        self.operation = Some(operation);
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn failed(&self) -> Option<&FailedRecord> {
        self.failed.as_ref()
    }

    fn record_receipt(&mut self, receipt: TransferReceipt) {
        self.external_id = Some(receipt.external_id);
        if receipt.end_to_end_id.is_some() {
            self.end_to_end_id = receipt.end_to_end_id;
        }
    }

    fn record_confirmation(&mut self, end_to_end_id: Option<String>) {
        if end_to_end_id.is_some() {
            self.end_to_end_id = end_to_end_id;
        }
        self.confirmed_at = Some(Utc::now());
    }

    fn record_failure(&mut self, failed: FailedRecord) {
        self.failed = Some(failed);
    }

    fn record_chargeback(&mut self, reason: &str, failed: FailedRecord) {
        self.chargeback_reason = Some(reason.to_string());
        self.failed = Some(failed);
    }

    fn reverted_at(&self) -> Option<DateTime<Utc>> {
        self.reverted_at
    }

    fn record_revert(&mut self, at: DateTime<Utc>) {
        self.reverted_at = Some(at);
    }
}

/// Validates the request, reserves the debit and persists the payment as
/// Pending, or Scheduled when `payment_date` lies in the future.
pub async fn create_payment(ctx: &SagaContext, request: CreatePaymentRequest) -> SagaResult<Payment> {
    if request.value <= 0 {
        return Err(DomainError::InvalidAmount.into());
    }
    if request.beneficiary.account_number.trim().is_empty() {
        return Err(DomainError::Validation("beneficiary account number is required".into()).into());
    }

    let payment = Payment::new(
        request.id,
        request.user_id,
        request.value,
        request.beneficiary,
        request.description,
        request.payment_date,
    );
    let description = format!("Pix payment {}", payment.id);
    outbound::create_transfer(
        ctx,
        payment,
        &ctx.settings.operation_tags.payment,
        description,
    )
    .await
}

/// Scheduled -> Pending once the payment date has arrived.
pub async fn handle_scheduled_payment(
    ctx: &SagaContext,
    id: Uuid,
    now: DateTime<Utc>,
) -> SagaResult<Payment> {
    let repository = ctx.repositories.payments.as_ref();
    let mut payment = guarded!(load_guarded(repository, id, &[PaymentState::Scheduled]));

    if !payment.is_due(now) {
        return Ok(Transition::Ignored {
            reason: format!("payment {} not due before {:?}", id, payment.payment_date),
        });
    }

    payment.transition(PaymentState::Pending)?;
    let payment = repository.update(&payment).await?;
    info!(entity_id = %id, "scheduled payment is due");
    let events = vec![OutboundEvent::entity(Domain::Payment, names::PENDING, &payment)?];
    Ok(Transition::Applied {
        entity: payment,
        events,
    })
}

pub async fn handle_pending_payment(ctx: &SagaContext, id: Uuid) -> SagaResult<Payment> {
    outbound::handle_pending(ctx, id).await
}

pub async fn handle_waiting_payment(
    ctx: &SagaContext,
    id: Uuid,
    end_to_end_id: Option<String>,
) -> SagaResult<Payment> {
    outbound::handle_waiting(ctx, id, end_to_end_id).await
}

pub async fn handle_revert_payment(ctx: &SagaContext, id: Uuid) -> SagaResult<Payment> {
    outbound::handle_revert(ctx, id).await
}

pub async fn handle_chargeback_payment(
    ctx: &SagaContext,
    id: Uuid,
    reason: &str,
) -> SagaResult<Payment> {
    outbound::handle_chargeback(ctx, id, reason).await
}

pub async fn handle_dead_letter_payment(ctx: &SagaContext, id: Uuid) -> SagaResult<Payment> {
    outbound::handle_dead_letter(ctx, id).await
}

pub async fn sync_waiting_payment(ctx: &SagaContext, id: Uuid) -> SagaResult<Payment> {
    outbound::sync_waiting(ctx, id).await
}

/// Scheduled|Pending -> Canceled. Payments already handed to the scheme
/// cannot be canceled. The reserved debit is reverted first; if the ledger
/// refuses, the payment stays untouched.
pub async fn cancel_payment(ctx: &SagaContext, id: Uuid) -> SagaResult<Payment> {
    let repository = ctx.repositories.payments.as_ref();
    let mut payment = guarded!(load_guarded(
        repository,
        id,
        &[PaymentState::Scheduled, PaymentState::Pending]
    ));

    if let Some(operation) = payment.operation {
        if let Err(e) = ctx.gateways.operations.revert_operation(operation.id).await {
            warn!(entity_id = %id, error = %e, "failed to revert operation of canceled payment");
            return Ok(Transition::Failed {
                entity_id: id,
                failed: gateway_failure(ctx.translator.as_ref(), &e),
                events: Vec::new(),
            });
        }
    }

    payment.transition(PaymentState::Canceled)?;
    payment.canceled_at = Some(Utc::now());
    let payment = repository.update(&payment).await?;
    info!(entity_id = %id, "payment canceled");
    let events = vec![OutboundEvent::entity(Domain::Payment, names::CANCELED, &payment)?];
    Ok(Transition::Applied {
        entity: payment,
        events,
    })
}
