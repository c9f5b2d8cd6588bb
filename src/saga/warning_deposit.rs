use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{SagaEntity, WarningPixDeposit, WarningPixDepositState};
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, WarningTransactionRequest};
use crate::saga::failure::gateway_failure;
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

/// Created -> Checked once compliance opened its analysis. On failure the
/// hold stays Created with the failure recorded, and the reconciliation job
/// retries it.
pub async fn handle_created_warning_deposit(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<WarningPixDeposit> {
    let repository = ctx.repositories.warning_deposits.as_ref();
    let mut warning = guarded!(load_guarded(repository, id, &[WarningPixDepositState::Created]));

    let deposit_amount = match ctx.repositories.deposits.get_by_id(warning.deposit_id).await? {
        Some(deposit) => deposit.amount,
        None => {
            return Ok(Transition::Ignored {
                reason: format!("deposit {} of warning {} not found", warning.deposit_id, id),
            })
        }
    };

    let request = WarningTransactionRequest {
        warning_deposit_id: warning.id,
        deposit_id: warning.deposit_id,
        user_id: warning.user_id,
        amount: deposit_amount,
        reasons: warning.reasons.clone(),
    };
    match ctx.gateways.compliance.create_warning_transaction(&request).await {
        Ok(transaction_id) => {
            warning.warning_transaction_id = Some(transaction_id);
            warning.failed = None;
            warning.transition(WarningPixDepositState::Checked)?;
            let warning = repository.update(&warning).await?;
            info!(entity_id = %id, deposit_id = %warning.deposit_id, "warning deposit sent to compliance");
            let events = vec![OutboundEvent::entity(Domain::WarningDeposit, names::CHECKED, &warning)?];
            Ok(Transition::Applied {
                entity: warning,
                events,
            })
        }
        Err(e) => {
            warn!(entity_id = %id, error = %e, "compliance refused warning transaction");
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            warning.failed = Some(failed.clone());
            warning.touch();
            repository.update(&warning).await?;
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events: Vec::new(),
            })
        }
    }
}

/// Checked -> Approved; the deposit saga credits the held deposit.
pub async fn approve_warning_deposit(ctx: &SagaContext, id: Uuid) -> SagaResult<WarningPixDeposit> {
    decide(ctx, id, WarningPixDepositState::Approved, names::APPROVED).await
}

/// Checked -> Rejected; the deposit saga blocks and devolves the deposit.
pub async fn reject_warning_deposit(ctx: &SagaContext, id: Uuid) -> SagaResult<WarningPixDeposit> {
    decide(ctx, id, WarningPixDepositState::Rejected, names::REJECTED).await
}

async fn decide(
    ctx: &SagaContext,
    id: Uuid,
    next: WarningPixDepositState,
    event: &str,
) -> SagaResult<WarningPixDeposit> {
    let repository = ctx.repositories.warning_deposits.as_ref();
    let mut warning = guarded!(load_guarded(repository, id, &[WarningPixDepositState::Checked]));

    warning.transition(next)?;
    let warning = repository.update(&warning).await?;
    info!(entity_id = %id, state = %warning.state, "compliance decision recorded");
    let events = vec![OutboundEvent::entity(Domain::WarningDeposit, event, &warning)?];
    Ok(Transition::Applied {
        entity: warning,
        events,
    })
}
