//! Refund requests received from the scheme against credits of our users,
//! and the refund devolution that honours an accepted request.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    PixInfractionRefundOperation, PixInfractionRefundOperationState, PixRefund,
    PixRefundDevolution, PixRefundDevolutionState, PixRefundReason, PixRefundRejectionReason,
    PixRefundState, PixRefundStatus, SagaEntity,
};
use crate::error::{DomainError, GatewayError, SagaError};
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, IssueKind, IssueRequest, IssueUpdate};
use crate::saga::failure::gateway_failure;
use crate::saga::outbound;
use crate::saga::resolve::{resolve_by_end_to_end_id, resolve_reference};
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRefundRequest {
    pub id: Uuid,
    pub refund_psp_id: String,
    pub infraction_id: Option<Uuid>,
    pub end_to_end_id: String,
    pub amount: i64,
    pub reason: PixRefundReason,
    pub requester_ispb: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRefundRequest {
    pub id: Uuid,
    pub analysis_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRefundRequest {
    pub id: Uuid,
    pub rejection_reason: PixRefundRejectionReason,
    pub analysis_details: Option<String>,
}

fn emit(event: &str, refund: &PixRefund) -> Result<Vec<OutboundEvent>, SagaError> {
    Ok(vec![OutboundEvent::entity(Domain::Refund, event, refund)?])
}

/// Persists a refund request in ReceivePending. Only credits can be refunded
/// and never for more than they moved.
pub async fn receive_refund(ctx: &SagaContext, request: ReceiveRefundRequest) -> SagaResult<PixRefund> {
    if request.amount <= 0 {
        return Err(DomainError::InvalidAmount.into());
    }
    let repository = ctx.repositories.refunds.as_ref();
    if repository.get_by_id(request.id).await?.is_some()
        || repository
            .find_one_by_field(&["refundPspId"], &request.refund_psp_id)
            .await?
            .is_some()
    {
        return Ok(Transition::Ignored {
            reason: format!("refund {} already received", request.refund_psp_id),
        });
    }

    let transaction = resolve_by_end_to_end_id(ctx, &request.end_to_end_id)
        .await?
        .ok_or_else(|| DomainError::TransactionNotFound(request.end_to_end_id.clone()))?;
    if !transaction.reference.kind.is_credit() {
        return Err(DomainError::Validation(format!(
            "{} is not a credit and cannot be refunded",
            transaction.reference
        ))
        .into());
    }
    if request.amount > transaction.amount {
        return Err(DomainError::AmountExceeded {
            requested: request.amount,
            available: transaction.amount,
        }
        .into());
    }

    let now = Utc::now();
    let refund = PixRefund {
        id: request.id,
        refund_psp_id: request.refund_psp_id,
        infraction_id: request.infraction_id,
        refund_devolution_id: None,
        transaction: transaction.reference,
        user_id: transaction.user_id,
        amount: request.amount,
        reason: request.reason,
        requester_ispb: request.requester_ispb,
        issue_id: None,
        analysis_details: request.description,
        rejection_reason: None,
        status: PixRefundStatus::Open,
        state: PixRefundState::ReceivePending,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let refund = repository.create(&refund).await?;
    info!(entity_id = %refund.id, transaction = %refund.transaction, amount = refund.amount, "refund received");
    let events = emit(names::RECEIVE_PENDING, &refund)?;
    Ok(Transition::Applied {
        entity: refund,
        events,
    })
}

/// ReceivePending -> ReceiveConfirmed once an analysis ticket exists.
pub async fn handle_receive_pending_refund(ctx: &SagaContext, id: Uuid) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    let mut refund = guarded!(load_guarded(repository, id, &[PixRefundState::ReceivePending]));

    let request = IssueRequest {
        kind: IssueKind::Refund,
        entity_id: refund.id,
        transaction: Some(refund.transaction),
        summary: format!("Pix refund request {}", refund.refund_psp_id),
        description: refund.analysis_details.clone(),
    };
    match ctx.gateways.issues.create_issue(&request).await {
        Ok(issue_id) => {
            refund.issue_id = Some(issue_id);
            refund.transition(PixRefundState::ReceiveConfirmed)?;
            let refund = repository.update(&refund).await?;
            let events = emit(names::RECEIVE_CONFIRMED, &refund)?;
            Ok(Transition::Applied {
                entity: refund,
                events,
            })
        }
        Err(e) => fail(ctx, refund, &e).await,
    }
}

/// ReceiveConfirmed -> ClosePending. Sends the money back through a
/// `PixRefundDevolution` and links both ledger operations. A refund past its
/// devolution window cannot be closed, only canceled.
pub async fn close_refund(ctx: &SagaContext, request: CloseRefundRequest) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    let mut refund = guarded!(load_guarded(repository, request.id, &[PixRefundState::ReceiveConfirmed]));

    let interval_days = ctx.settings.refund_devolution_interval_days;
    if !refund.can_create_refund_devolution(interval_days, Utc::now()) {
        return Err(DomainError::RefundDevolutionWindowExpired { interval_days }.into());
    }

    let transaction = resolve_reference(ctx, refund.transaction)
        .await?
        .ok_or_else(|| DomainError::NotFound {
            entity: "transaction",
            id: refund.transaction.to_string(),
        })?;
    let (Some(original_end_to_end_id), Some(original_operation)) =
        (transaction.end_to_end_id, transaction.operation)
    else {
        return Err(DomainError::Validation(format!(
            "{} was never settled and cannot be refunded",
            refund.transaction
        ))
        .into());
    };

    let mut events = Vec::new();
    let refund_devolutions = ctx.repositories.refund_devolutions.as_ref();
    let devolution = match refund_devolutions
        .find_one_by_field(&["refundId"], &refund.id.to_string())
        .await?
    {
        Some(existing) => existing,
        None => {
            let now = Utc::now();
            let devolution = PixRefundDevolution {
                id: Uuid::new_v4(),
                user_id: refund.user_id,
                refund_id: refund.id,
                transaction: refund.transaction,
                state: PixRefundDevolutionState::Pending,
                amount: refund.amount,
                original_end_to_end_id,
                end_to_end_id: None,
                external_id: None,
                chargeback_reason: None,
                operation: None,
                failed: None,
                reverted_at: None,
                created_at: now,
                updated_at: now,
            };
            let description = format!("Pix refund devolution of refund {}", refund.id);
            match outbound::create_transfer(
                ctx,
                devolution,
                &ctx.settings.operation_tags.refund_devolution,
                description,
            )
            .await?
            {
                Transition::Applied {
                    entity,
                    events: created,
                } => {
                    events.extend(created);
                    entity
                }
                Transition::Failed { failed, .. } => {
                    warn!(entity_id = %refund.id, failed = %failed, "refund devolution debit refused");
                    refund.failed = Some(failed.clone());
                    refund.touch();
                    repository.update(&refund).await?;
                    return Ok(Transition::Failed {
                        entity_id: refund.id,
                        failed,
                        events: Vec::new(),
                    });
                }
                Transition::Emitted { .. } | Transition::Ignored { .. } => {
                    return Ok(Transition::Ignored {
                        reason: format!("refund devolution of refund {} raced", refund.id),
                    });
                }
            }
        }
    };

    let Some(refund_operation) = devolution.operation else {
        return Err(DomainError::Validation(format!(
            "refund devolution {} has no ledger operation",
            devolution.id
        ))
        .into());
    };
    let operations = ctx.repositories.refund_operations.as_ref();
    if operations
        .find_one_by_field(&["refundId"], &refund.id.to_string())
        .await?
        .is_none()
    {
        let link = PixInfractionRefundOperation::new(
            refund.user_id,
            refund.id,
            refund.infraction_id,
            original_operation,
            refund_operation,
        );
        operations.create(&link).await?;
    }

    refund.refund_devolution_id = Some(devolution.id);
    refund.analysis_details = request.analysis_details.or(refund.analysis_details);
    refund.transition(PixRefundState::ClosePending)?;
    let refund = repository.update(&refund).await?;
    info!(entity_id = %refund.id, refund_devolution_id = %devolution.id, "refund closing");

    let mut all = emit(names::CLOSE_PENDING, &refund)?;
    all.extend(events);
    Ok(Transition::Applied {
        entity: refund,
        events: all,
    })
}

/// ClosePending -> CloseConfirmed once the refund devolution settled and the
/// scheme accepted the closure. A scheme failure leaves the refund in
/// ClosePending for reconciliation: the money already moved.
pub async fn handle_refund_devolution_confirmed(ctx: &SagaContext, refund_id: Uuid) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    let mut refund = guarded!(load_guarded(repository, refund_id, &[PixRefundState::ClosePending]));

    let devolution_end_to_end_id = match refund.refund_devolution_id {
        Some(devolution_id) => ctx
            .repositories
            .refund_devolutions
            .get_by_id(devolution_id)
            .await?
            .and_then(|devolution| devolution.end_to_end_id),
        None => None,
    };

    if let Err(e) = ctx
        .gateways
        .pix
        .close_refund(&refund.refund_psp_id, devolution_end_to_end_id.as_deref())
        .await
    {
        warn!(entity_id = %refund_id, error = %e, "scheme refused refund closure");
        let failed = gateway_failure(ctx.translator.as_ref(), &e);
        refund.failed = Some(failed.clone());
        refund.touch();
        repository.update(&refund).await?;
        return Ok(Transition::Failed {
            entity_id: refund_id,
            failed,
            events: Vec::new(),
        });
    }

    refund.status = PixRefundStatus::Closed;
    refund.failed = None;
    refund.transition(PixRefundState::CloseConfirmed)?;
    let refund = repository.update(&refund).await?;
    settle_refund_operation(ctx, refund.id, PixInfractionRefundOperationState::Closed).await?;
    update_issue(ctx, &refund, refund.analysis_details.clone()).await;
    info!(entity_id = %refund.id, "refund closed");
    let events = emit(names::CLOSE_CONFIRMED, &refund)?;
    Ok(Transition::Applied {
        entity: refund,
        events,
    })
}

/// ReceiveConfirmed -> CancelPending with the rejection reason.
pub async fn cancel_refund(ctx: &SagaContext, request: CancelRefundRequest) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    let mut refund = guarded!(load_guarded(repository, request.id, &[PixRefundState::ReceiveConfirmed]));

    refund.rejection_reason = Some(request.rejection_reason);
    refund.analysis_details = request.analysis_details.or(refund.analysis_details);
    refund.transition(PixRefundState::CancelPending)?;
    let refund = repository.update(&refund).await?;
    let events = emit(names::CANCEL_PENDING, &refund)?;
    Ok(Transition::Applied {
        entity: refund,
        events,
    })
}

/// CancelPending -> CancelConfirmed once the scheme recorded the rejection.
pub async fn handle_cancel_pending_refund(ctx: &SagaContext, id: Uuid) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    let mut refund = guarded!(load_guarded(repository, id, &[PixRefundState::CancelPending]));

    let reason = refund
        .rejection_reason
        .unwrap_or(PixRefundRejectionReason::Other);
    if let Err(e) = ctx
        .gateways
        .pix
        .cancel_refund(&refund.refund_psp_id, reason, refund.analysis_details.as_deref())
        .await
    {
        return fail(ctx, refund, &e).await;
    }

    refund.status = PixRefundStatus::Canceled;
    refund.transition(PixRefundState::CancelConfirmed)?;
    let refund = repository.update(&refund).await?;
    update_issue(ctx, &refund, refund.analysis_details.clone()).await;
    let events = emit(names::CANCEL_CONFIRMED, &refund)?;
    Ok(Transition::Applied {
        entity: refund,
        events,
    })
}

/// Pending states -> Error. Cancels the linked refund operation and tells the
/// ticket; the ticket update is best effort.
pub async fn handle_revert_refund(ctx: &SagaContext, id: Uuid) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    let mut refund = guarded!(load_guarded(
        repository,
        id,
        &[
            PixRefundState::ReceivePending,
            PixRefundState::ClosePending,
            PixRefundState::CancelPending,
        ]
    ));

    refund.transition(PixRefundState::Error)?;
    let refund = repository.update(&refund).await?;
    settle_refund_operation(ctx, refund.id, PixInfractionRefundOperationState::Canceled).await?;
    let comment = refund.failed.as_ref().map(|failed| failed.to_string());
    update_issue(ctx, &refund, comment).await;
    warn!(entity_id = %id, failed = ?refund.failed, "refund reverted");
    let events = emit(names::ERROR, &refund)?;
    Ok(Transition::Applied {
        entity: refund,
        events,
    })
}

/// `REFUND_DEVOLUTION.FAILED`: the money could not be returned, so the refund
/// itself fails.
pub async fn handle_refund_devolution_failed(ctx: &SagaContext, refund_id: Uuid) -> SagaResult<PixRefund> {
    let repository = ctx.repositories.refunds.as_ref();
    if let Some(mut refund) = repository.get_by_id(refund_id).await? {
        if refund.state == PixRefundState::ClosePending && refund.failed.is_none() {
            let devolution_failed = match refund.refund_devolution_id {
                Some(devolution_id) => ctx
                    .repositories
                    .refund_devolutions
                    .get_by_id(devolution_id)
                    .await?
                    .and_then(|devolution| devolution.failed),
                None => None,
            };
            if let Some(failed) = devolution_failed {
                refund.failed = Some(failed);
                repository.update(&refund).await?;
            }
        }
    }
    handle_revert_refund(ctx, refund_id).await
}

async fn settle_refund_operation(
    ctx: &SagaContext,
    refund_id: Uuid,
    next: PixInfractionRefundOperationState,
) -> Result<(), SagaError> {
    let operations = ctx.repositories.refund_operations.as_ref();
    let Some(mut link) = operations
        .find_one_by_field(&["refundId"], &refund_id.to_string())
        .await?
    else {
        return Ok(());
    };
    if link.state() == PixInfractionRefundOperationState::Open {
        link.transition(next)?;
        operations.update(&link).await?;
    }
    Ok(())
}

async fn fail(ctx: &SagaContext, mut refund: PixRefund, error: &GatewayError) -> SagaResult<PixRefund> {
    warn!(entity_id = %refund.id, state = %refund.state, error = %error, "refund step failed");
    let failed = gateway_failure(ctx.translator.as_ref(), error);
    refund.failed = Some(failed.clone());
    refund.touch();
    let refund = ctx.repositories.refunds.update(&refund).await?;
    let events = emit(names::REVERTED, &refund)?;
    Ok(Transition::Failed {
        entity_id: refund.id,
        failed,
        events,
    })
}

async fn update_issue(ctx: &SagaContext, refund: &PixRefund, comment: Option<String>) {
    let Some(issue_id) = refund.issue_id.as_deref() else {
        return;
    };
    let update = IssueUpdate {
        status: refund.state.to_string(),
        comment,
    };
    if let Err(e) = ctx.gateways.issues.update_issue(issue_id, &update).await {
        warn!(entity_id = %refund.id, issue_id, error = %e, "failed to update refund issue");
    }
}

pub async fn handle_pending_refund_devolution(ctx: &SagaContext, id: Uuid) -> SagaResult<PixRefundDevolution> {
    outbound::handle_pending(ctx, id).await
}

pub async fn handle_waiting_refund_devolution(
    ctx: &SagaContext,
    id: Uuid,
    end_to_end_id: Option<String>,
) -> SagaResult<PixRefundDevolution> {
    outbound::handle_waiting(ctx, id, end_to_end_id).await
}

pub async fn handle_revert_refund_devolution(ctx: &SagaContext, id: Uuid) -> SagaResult<PixRefundDevolution> {
    outbound::handle_revert(ctx, id).await
}

pub async fn handle_chargeback_refund_devolution(
    ctx: &SagaContext,
    id: Uuid,
    reason: &str,
) -> SagaResult<PixRefundDevolution> {
    outbound::handle_chargeback(ctx, id, reason).await
}

pub async fn handle_dead_letter_refund_devolution(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixRefundDevolution> {
    outbound::handle_dead_letter(ctx, id).await
}

pub async fn sync_waiting_refund_devolution(ctx: &SagaContext, id: Uuid) -> SagaResult<PixRefundDevolution> {
    outbound::sync_waiting(ctx, id).await
}
