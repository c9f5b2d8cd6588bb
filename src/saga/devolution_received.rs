//! Devolutions the scheme delivers to us, returning money of a payment we sent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{PixAccount, PixDevolutionReceived, PixDevolutionReceivedState, SagaEntity};
use crate::error::DomainError;
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, OperationRequest};
use crate::saga::failure::gateway_failure;
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveDevolutionRequest {
    pub id: Uuid,
    pub amount: i64,
    pub end_to_end_id: String,
    pub original_end_to_end_id: String,
    pub third_part: Option<PixAccount>,
    pub reason: Option<String>,
}

/// Persists the devolution as Ready. Unique by end-to-end id; the original
/// payment is resolved by its end-to-end id.
pub async fn receive_devolution(
    ctx: &SagaContext,
    request: ReceiveDevolutionRequest,
) -> SagaResult<PixDevolutionReceived> {
    if request.amount <= 0 {
        return Err(DomainError::InvalidAmount.into());
    }
    let repository = ctx.repositories.devolutions_received.as_ref();

    if repository.get_by_id(request.id).await?.is_some()
        || repository
            .find_one_by_field(&["endToEndId"], &request.end_to_end_id)
            .await?
            .is_some()
    {
        return Ok(Transition::Ignored {
            reason: format!("devolution {} already received", request.end_to_end_id),
        });
    }

    let payment = ctx
        .repositories
        .payments
        .find_one_by_field(&["endToEndId"], &request.original_end_to_end_id)
        .await?
        .ok_or_else(|| DomainError::TransactionNotFound(request.original_end_to_end_id.clone()))?;
    if request.amount > payment.value {
        return Err(DomainError::AmountExceeded {
            requested: request.amount,
            available: payment.value,
        }
        .into());
    }

    let now = Utc::now();
    let devolution = PixDevolutionReceived {
        id: request.id,
        user_id: payment.user_id,
        payment_id: payment.id,
        state: PixDevolutionReceivedState::Ready,
        amount: request.amount,
        end_to_end_id: request.end_to_end_id,
        original_end_to_end_id: request.original_end_to_end_id,
        third_part: request.third_part,
        reason: request.reason,
        operation: None,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let devolution = repository.create(&devolution).await?;
    info!(entity_id = %devolution.id, payment_id = %payment.id, "devolution received");
    let events = vec![OutboundEvent::entity(Domain::DevolutionReceived, names::READY, &devolution)?];
    Ok(Transition::Applied {
        entity: devolution,
        events,
    })
}

/// Ready -> Received once the amount is credited back to the payer.
pub async fn handle_ready_devolution_received(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixDevolutionReceived> {
    let repository = ctx.repositories.devolutions_received.as_ref();
    let mut devolution = guarded!(load_guarded(
        repository,
        id,
        &[PixDevolutionReceivedState::Ready]
    ));

    let request = OperationRequest {
        id: devolution.id,
        tag: ctx.settings.operation_tags.devolution_received.clone(),
        owner_id: devolution.user_id,
        value: devolution.amount,
        description: format!("Pix devolution received {}", devolution.end_to_end_id),
    };
    match ctx.gateways.operations.create_operation(&request).await {
        Ok(operation) => {
            devolution.operation = Some(operation);
            devolution.transition(PixDevolutionReceivedState::Received)?;
            let devolution = repository.update(&devolution).await?;
            info!(entity_id = %id, "devolution received credited");
            let events = vec![OutboundEvent::entity(
                Domain::DevolutionReceived,
                names::RECEIVED,
                &devolution,
            )?];
            Ok(Transition::Applied {
                entity: devolution,
                events,
            })
        }
        Err(e) => {
            warn!(entity_id = %id, error = %e, "failed to credit devolution received");
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            devolution.failed = Some(failed.clone());
            devolution.touch();
            let devolution = repository.update(&devolution).await?;
            let events = vec![OutboundEvent::entity(
                Domain::DevolutionReceived,
                names::FAILED,
                &devolution,
            )?];
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events,
            })
        }
    }
}

/// Ready -> Error.
pub async fn handle_failed_devolution_received(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixDevolutionReceived> {
    let repository = ctx.repositories.devolutions_received.as_ref();
    let mut devolution = guarded!(load_guarded(
        repository,
        id,
        &[PixDevolutionReceivedState::Ready]
    ));

    devolution.transition(PixDevolutionReceivedState::Error)?;
    let devolution = repository.update(&devolution).await?;
    warn!(entity_id = %id, failed = ?devolution.failed, "devolution received failed");
    let events = vec![OutboundEvent::entity(Domain::DevolutionReceived, names::ERROR, &devolution)?];
    Ok(Transition::Applied {
        entity: devolution,
        events,
    })
}
