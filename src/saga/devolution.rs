use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{PixDeposit, PixDepositState, PixDevolution, PixDevolutionState};
use crate::error::DomainError;
use crate::ports::DevolutionRepositoryExt;
use crate::saga::outbound;
use crate::saga::{SagaContext, SagaResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDevolutionRequest {
    pub id: Uuid,
    pub deposit_id: Uuid,
    pub amount: i64,
    pub description: Option<String>,
}

/// Amount of `deposit` still available for devolution.
pub async fn available_amount(ctx: &SagaContext, deposit: &PixDeposit) -> Result<i64, crate::error::SagaError> {
    let devolved = ctx
        .repositories
        .devolutions
        .total_devolution_amount_by_deposit(deposit.id)
        .await?;
    Ok(deposit.amount - devolved)
}

/// Creates a devolution of (part of) a received deposit. The sum of live
/// devolutions of a deposit never exceeds its amount.
pub async fn create_devolution(
    ctx: &SagaContext,
    request: CreateDevolutionRequest,
) -> SagaResult<PixDevolution> {
    if request.amount <= 0 {
        return Err(DomainError::InvalidAmount.into());
    }

    let deposit = ctx
        .repositories
        .deposits
        .get_by_id(request.deposit_id)
        .await?
        .ok_or_else(|| DomainError::NotFound {
            entity: "pix_deposit",
            id: request.deposit_id.to_string(),
        })?;
    if deposit.state != PixDepositState::Received {
        return Err(DomainError::Validation(format!(
            "deposit {} is {} and cannot be devolved",
            deposit.id, deposit.state
        ))
        .into());
    }

    if ctx.repositories.devolutions.get_by_id(request.id).await?.is_none() {
        let available = available_amount(ctx, &deposit).await?;
        if request.amount > available {
            return Err(DomainError::AmountExceeded {
                requested: request.amount,
                available,
            }
            .into());
        }
    }

    let now = Utc::now();
    let devolution = PixDevolution {
        id: request.id,
        user_id: deposit.user_id,
        deposit_id: deposit.id,
        state: PixDevolutionState::Pending,
        amount: request.amount,
        description: request.description,
        original_end_to_end_id: deposit.end_to_end_id.clone(),
        end_to_end_id: None,
        external_id: None,
        chargeback_reason: None,
        operation: None,
        failed: None,
        reverted_at: None,
        created_at: now,
        updated_at: now,
    };
    let description = format!("Pix devolution {} of deposit {}", devolution.id, deposit.id);
    outbound::create_transfer(
        ctx,
        devolution,
        &ctx.settings.operation_tags.devolution,
        description,
    )
    .await
}

pub async fn handle_pending_devolution(ctx: &SagaContext, id: Uuid) -> SagaResult<PixDevolution> {
    outbound::handle_pending(ctx, id).await
}

pub async fn handle_waiting_devolution(
    ctx: &SagaContext,
    id: Uuid,
    end_to_end_id: Option<String>,
) -> SagaResult<PixDevolution> {
    outbound::handle_waiting(ctx, id, end_to_end_id).await
}

pub async fn handle_revert_devolution(ctx: &SagaContext, id: Uuid) -> SagaResult<PixDevolution> {
    outbound::handle_revert(ctx, id).await
}

pub async fn handle_chargeback_devolution(
    ctx: &SagaContext,
    id: Uuid,
    reason: &str,
) -> SagaResult<PixDevolution> {
    outbound::handle_chargeback(ctx, id, reason).await
}

pub async fn handle_dead_letter_devolution(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixDevolution> {
    outbound::handle_dead_letter(ctx, id).await
}

pub async fn sync_waiting_devolution(ctx: &SagaContext, id: Uuid) -> SagaResult<PixDevolution> {
    outbound::sync_waiting(ctx, id).await
}
