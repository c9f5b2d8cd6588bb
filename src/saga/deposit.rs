//! Inbound credits: reception, screening, crediting, and the outcome of the
//! compliance analysis of held deposits.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    PixAccount, PixDeposit, PixDepositState, SagaEntity, WarningPixDeposit,
    WarningPixDepositState, WarningPixDevolution, WarningPixDevolutionState,
};
use crate::error::DomainError;
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, OperationRequest};
use crate::saga::failure::gateway_failure;
use crate::saga::outbound;
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};
use crate::screening::ScreeningPipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveDepositRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub end_to_end_id: String,
    pub txid: Option<String>,
    pub client: PixAccount,
    pub third_part: PixAccount,
    pub description: Option<String>,
}

/// Identifies the deposit behind a warning deposit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningDepositRef {
    pub id: Uuid,
    pub deposit_id: Uuid,
}

/// Persists a deposit notified by the scheme. Deposits are unique by id and
/// by end-to-end id; a repeated notification is ignored.
pub async fn receive_deposit(ctx: &SagaContext, request: ReceiveDepositRequest) -> SagaResult<PixDeposit> {
    if request.amount <= 0 {
        return Err(DomainError::InvalidAmount.into());
    }
    let repository = ctx.repositories.deposits.as_ref();

    if repository.get_by_id(request.id).await?.is_some() {
        return Ok(Transition::Ignored {
            reason: format!("pix_deposit {} already exists", request.id),
        });
    }
    if let Some(existing) = repository
        .find_one_by_field(&["endToEndId"], &request.end_to_end_id)
        .await?
    {
        warn!(
            entity_id = %request.id,
            existing_id = %existing.id,
            end_to_end_id = %request.end_to_end_id,
            "deposit end to end id already received"
        );
        return Ok(Transition::Ignored {
            reason: format!("end to end id {} already received", request.end_to_end_id),
        });
    }

    let now = Utc::now();
    let deposit = PixDeposit {
        id: request.id,
        user_id: request.user_id,
        state: PixDepositState::New,
        amount: request.amount,
        end_to_end_id: request.end_to_end_id,
        txid: request.txid,
        client: request.client,
        third_part: request.third_part,
        description: request.description,
        is_duplicated: false,
        warning_reasons: Vec::new(),
        operation: None,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let deposit = repository.create(&deposit).await?;
    info!(entity_id = %deposit.id, amount = deposit.amount, "deposit received");
    let events = vec![OutboundEvent::entity(Domain::Deposit, names::NEW, &deposit)?];
    Ok(Transition::Applied {
        entity: deposit,
        events,
    })
}

/// New -> Received when screening is clear and the credit is booked, or
/// New -> Waiting with a `WarningPixDeposit` when any check flags it.
pub async fn handle_new_deposit(ctx: &SagaContext, id: Uuid) -> SagaResult<PixDeposit> {
    let repository = ctx.repositories.deposits.as_ref();
    let mut deposit = guarded!(load_guarded(repository, id, &[PixDepositState::New]));

    // A previous attempt may have created the hold and failed before moving
    // the deposit; resume from it instead of screening again.
    let existing_warning = ctx
        .repositories
        .warning_deposits
        .find_one_by_field(&["depositId"], &id.to_string())
        .await?;

    let (reasons, is_duplicated) = match &existing_warning {
        Some(warning) => (warning.reasons.clone(), deposit.is_duplicated),
        None => {
            let report = ScreeningPipeline::from_context(ctx).screen(&deposit).await;
            (report.reasons, report.is_duplicated)
        }
    };

    if reasons.is_empty() {
        return credit_deposit(ctx, deposit).await;
    }

    let warning = match existing_warning {
        Some(warning) => warning,
        None => {
            let now = Utc::now();
            let warning = WarningPixDeposit {
                id: Uuid::new_v4(),
                deposit_id: deposit.id,
                user_id: deposit.user_id,
                reasons: reasons.clone(),
                warning_transaction_id: None,
                state: WarningPixDepositState::Created,
                failed: None,
                created_at: now,
                updated_at: now,
            };
            ctx.repositories.warning_deposits.create(&warning).await?
        }
    };

    deposit.is_duplicated = is_duplicated;
    deposit.warning_reasons = reasons;
    deposit.transition(PixDepositState::Waiting)?;
    let deposit = repository.update(&deposit).await?;
    info!(
        entity_id = %id,
        warning_deposit_id = %warning.id,
        reasons = ?deposit.warning_reasons,
        "deposit held for compliance analysis"
    );

    let events = vec![
        OutboundEvent::entity(Domain::Deposit, names::WAITING, &deposit)?,
        OutboundEvent::entity(Domain::WarningDeposit, names::CREATED, &warning)?,
    ];
    Ok(Transition::Applied {
        entity: deposit,
        events,
    })
}

/// New|Waiting -> Error after the credit could not be booked.
pub async fn handle_failed_deposit(ctx: &SagaContext, id: Uuid) -> SagaResult<PixDeposit> {
    let repository = ctx.repositories.deposits.as_ref();
    let mut deposit = guarded!(load_guarded(
        repository,
        id,
        &[PixDepositState::New, PixDepositState::Waiting]
    ));

    deposit.transition(PixDepositState::Error)?;
    let deposit = repository.update(&deposit).await?;
    warn!(entity_id = %id, failed = ?deposit.failed, "deposit failed");
    let events = vec![OutboundEvent::entity(Domain::Deposit, names::ERROR, &deposit)?];
    Ok(Transition::Applied {
        entity: deposit,
        events,
    })
}

/// Waiting -> Received once compliance approved the held deposit.
pub async fn handle_approved_warning_deposit(
    ctx: &SagaContext,
    deposit_id: Uuid,
) -> SagaResult<PixDeposit> {
    let deposit = guarded!(load_guarded(
        ctx.repositories.deposits.as_ref(),
        deposit_id,
        &[PixDepositState::Waiting]
    ));
    credit_deposit(ctx, deposit).await
}

/// Waiting -> Blocked once compliance rejected the held deposit; the amount
/// goes back to the payer through a `WarningPixDevolution`.
pub async fn handle_rejected_warning_deposit(
    ctx: &SagaContext,
    warning: WarningDepositRef,
) -> SagaResult<PixDeposit> {
    let repository = ctx.repositories.deposits.as_ref();
    let mut deposit = guarded!(load_guarded(
        repository,
        warning.deposit_id,
        &[PixDepositState::Waiting]
    ));

    let mut events = Vec::new();
    let existing = ctx
        .repositories
        .warning_devolutions
        .find_one_by_field(&["depositId"], &deposit.id.to_string())
        .await?;
    if existing.is_none() {
        let now = Utc::now();
        let devolution = WarningPixDevolution {
            id: Uuid::new_v4(),
            user_id: deposit.user_id,
            deposit_id: deposit.id,
            warning_deposit_id: warning.id,
            state: WarningPixDevolutionState::Pending,
            amount: deposit.amount,
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
        let description = format!("Warning devolution of deposit {}", deposit.id);
        match outbound::create_transfer(
            ctx,
            devolution,
            &ctx.settings.operation_tags.warning_devolution,
            description,
        )
        .await?
        {
            Transition::Failed { failed, events, .. } => {
                return Ok(Transition::Failed {
                    entity_id: deposit.id,
                    failed,
                    events,
                });
            }
            transition => events.extend(transition.into_events()),
        }
    }

    deposit.transition(PixDepositState::Blocked)?;
    let deposit = repository.update(&deposit).await?;
    info!(entity_id = %deposit.id, "deposit blocked after compliance rejection");
    events.insert(0, OutboundEvent::entity(Domain::Deposit, names::BLOCKED, &deposit)?);
    Ok(Transition::Applied {
        entity: deposit,
        events,
    })
}

async fn credit_deposit(ctx: &SagaContext, mut deposit: PixDeposit) -> SagaResult<PixDeposit> {
    let repository = ctx.repositories.deposits.as_ref();
    let request = OperationRequest {
        id: deposit.id,
        tag: ctx.settings.operation_tags.deposit.clone(),
        owner_id: deposit.user_id,
        value: deposit.amount,
        description: format!("Pix deposit {}", deposit.end_to_end_id),
    };

    match ctx.gateways.operations.create_operation(&request).await {
        Ok(operation) => {
            deposit.operation = Some(operation);
            deposit.transition(PixDepositState::Received)?;
            let deposit = repository.update(&deposit).await?;
            info!(entity_id = %deposit.id, amount = deposit.amount, "deposit credited");
            let events = vec![OutboundEvent::entity(Domain::Deposit, names::RECEIVED, &deposit)?];
            Ok(Transition::Applied {
                entity: deposit,
                events,
            })
        }
        Err(e) => {
            warn!(entity_id = %deposit.id, error = %e, "failed to credit deposit");
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            deposit.failed = Some(failed.clone());
            deposit.touch();
            let deposit = repository.update(&deposit).await?;
            let events = vec![OutboundEvent::entity(Domain::Deposit, names::FAILED, &deposit)?];
            Ok(Transition::Failed {
                entity_id: deposit.id,
                failed,
                events,
            })
        }
    }
}
