//! Disputes over a transaction, either reported by us to the scheme or
//! received from another participant.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    PixInfraction, PixInfractionAnalysisResult, PixInfractionState, PixInfractionStatus,
    PixInfractionType, SagaEntity, TransactionRef,
};
use crate::error::DomainError;
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, InfractionRequest, IssueKind, IssueRequest, IssueUpdate};
use crate::saga::failure::gateway_failure;
use crate::saga::resolve::{resolve_by_end_to_end_id, resolve_reference};
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInfractionRequest {
    pub id: Uuid,
    pub infraction_type: PixInfractionType,
    pub transaction: TransactionRef,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveInfractionRequest {
    pub id: Uuid,
    pub infraction_psp_id: String,
    pub infraction_type: PixInfractionType,
    pub end_to_end_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseInfractionRequest {
    pub id: Uuid,
    pub analysis_result: PixInfractionAnalysisResult,
    pub analysis_details: Option<String>,
}

/// Scheme notice that an infraction we reported was analysed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfractionClosedNotification {
    pub infraction_psp_id: String,
    pub analysis_result: PixInfractionAnalysisResult,
    pub analysis_details: Option<String>,
}

fn emit(event: &str, infraction: &PixInfraction) -> Result<Vec<OutboundEvent>, crate::error::SagaError> {
    Ok(vec![OutboundEvent::entity(Domain::Infraction, event, infraction)?])
}

/// Registers an infraction we intend to report, in NewConfirmed.
pub async fn create_infraction(
    ctx: &SagaContext,
    request: CreateInfractionRequest,
) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    if repository.get_by_id(request.id).await?.is_some() {
        return Ok(Transition::Ignored {
            reason: format!("pix_infraction {} already exists", request.id),
        });
    }

    let transaction = resolve_reference(ctx, request.transaction)
        .await?
        .ok_or_else(|| DomainError::NotFound {
            entity: "transaction",
            id: request.transaction.to_string(),
        })?;
    let end_to_end_id = transaction.end_to_end_id.ok_or_else(|| {
        DomainError::Validation(format!("transaction {} has no end to end id", request.transaction))
    })?;

    let now = Utc::now();
    let infraction = PixInfraction {
        id: request.id,
        issue_id: None,
        infraction_psp_id: None,
        infraction_type: request.infraction_type,
        transaction: request.transaction,
        end_to_end_id,
        description: request.description,
        analysis_result: None,
        analysis_details: None,
        status: PixInfractionStatus::New,
        state: PixInfractionState::NewConfirmed,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let infraction = repository.create(&infraction).await?;
    info!(entity_id = %infraction.id, transaction = %infraction.transaction, "infraction created");
    let events = emit(names::NEW_CONFIRMED, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// NewConfirmed -> OpenPending.
pub async fn open_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    move_to(ctx, id, &[PixInfractionState::NewConfirmed], PixInfractionState::OpenPending, names::OPEN_PENDING).await
}

/// OpenPending -> OpenConfirmed once the scheme registered the infraction.
pub async fn handle_open_pending_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(repository, id, &[PixInfractionState::OpenPending]));

    let request = InfractionRequest {
        id: infraction.id,
        infraction_type: infraction.infraction_type,
        end_to_end_id: infraction.end_to_end_id.clone(),
        description: infraction.description.clone(),
    };
    match ctx.gateways.pix.create_infraction(&request).await {
        Ok(psp_id) => {
            infraction.infraction_psp_id = Some(psp_id);
            infraction.status = PixInfractionStatus::Open;
            infraction.transition(PixInfractionState::OpenConfirmed)?;
            let infraction = repository.update(&infraction).await?;
            info!(entity_id = %id, "infraction opened at scheme");
            let events = emit(names::OPEN_CONFIRMED, &infraction)?;
            Ok(Transition::Applied {
                entity: infraction,
                events,
            })
        }
        Err(e) => fail(ctx, infraction, &e).await,
    }
}

/// Records an infraction another participant opened against one of our
/// transactions, in ReceivePending.
pub async fn receive_infraction(
    ctx: &SagaContext,
    request: ReceiveInfractionRequest,
) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    if repository.get_by_id(request.id).await?.is_some()
        || repository
            .find_one_by_field(&["infractionPspId"], &request.infraction_psp_id)
            .await?
            .is_some()
    {
        return Ok(Transition::Ignored {
            reason: format!("infraction {} already received", request.infraction_psp_id),
        });
    }

    let transaction = resolve_by_end_to_end_id(ctx, &request.end_to_end_id)
        .await?
        .ok_or_else(|| DomainError::TransactionNotFound(request.end_to_end_id.clone()))?;

    let now = Utc::now();
    let infraction = PixInfraction {
        id: request.id,
        issue_id: None,
        infraction_psp_id: Some(request.infraction_psp_id),
        infraction_type: request.infraction_type,
        transaction: transaction.reference,
        end_to_end_id: request.end_to_end_id,
        description: request.description,
        analysis_result: None,
        analysis_details: None,
        status: PixInfractionStatus::Received,
        state: PixInfractionState::ReceivePending,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let infraction = repository.create(&infraction).await?;
    info!(entity_id = %infraction.id, transaction = %infraction.transaction, "infraction received");
    let events = emit(names::RECEIVE_PENDING, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// ReceivePending -> ReceiveConfirmed once an analysis ticket exists.
pub async fn handle_receive_pending_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(repository, id, &[PixInfractionState::ReceivePending]));

    let request = IssueRequest {
        kind: IssueKind::Infraction,
        entity_id: infraction.id,
        transaction: Some(infraction.transaction),
        summary: format!("Pix infraction {}", infraction.end_to_end_id),
        description: infraction.description.clone(),
    };
    match ctx.gateways.issues.create_issue(&request).await {
        Ok(issue_id) => {
            infraction.issue_id = Some(issue_id);
            infraction.transition(PixInfractionState::ReceiveConfirmed)?;
            let infraction = repository.update(&infraction).await?;
            let events = emit(names::RECEIVE_CONFIRMED, &infraction)?;
            Ok(Transition::Applied {
                entity: infraction,
                events,
            })
        }
        Err(e) => fail(ctx, infraction, &e).await,
    }
}

/// ReceiveConfirmed -> ClosePending with the analysis outcome.
pub async fn close_infraction(ctx: &SagaContext, request: CloseInfractionRequest) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(
        repository,
        request.id,
        &[PixInfractionState::ReceiveConfirmed]
    ));

    infraction.analysis_result = Some(request.analysis_result);
    infraction.analysis_details = request.analysis_details;
    infraction.transition(PixInfractionState::ClosePending)?;
    let infraction = repository.update(&infraction).await?;
    let events = emit(names::CLOSE_PENDING, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// ClosePending -> CloseConfirmed once the scheme accepted the analysis. The
/// ticket update afterwards is best effort.
pub async fn handle_close_pending_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(repository, id, &[PixInfractionState::ClosePending]));

    let (Some(psp_id), Some(result)) = (infraction.infraction_psp_id.clone(), infraction.analysis_result) else {
        let error = DomainError::Validation(format!("infraction {} cannot be closed without analysis", id));
        return Err(error.into());
    };

    if let Err(e) = ctx
        .gateways
        .pix
        .close_infraction(&psp_id, result, infraction.analysis_details.as_deref())
        .await
    {
        return fail(ctx, infraction, &e).await;
    }

    infraction.status = PixInfractionStatus::Closed;
    infraction.transition(PixInfractionState::CloseConfirmed)?;
    let infraction = repository.update(&infraction).await?;
    update_issue(ctx, &infraction, infraction.analysis_details.clone()).await;
    info!(entity_id = %id, result = ?result, "infraction closed");
    let events = emit(names::CLOSE_CONFIRMED, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// OpenConfirmed -> CloseConfirmed when the scheme reports the outcome of an
/// infraction we opened.
pub async fn handle_close_notification(
    ctx: &SagaContext,
    notification: InfractionClosedNotification,
) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let Some(existing) = repository
        .find_one_by_field(&["infractionPspId"], &notification.infraction_psp_id)
        .await?
    else {
        return Ok(Transition::Ignored {
            reason: format!("infraction {} not found", notification.infraction_psp_id),
        });
    };
    let mut infraction = guarded!(load_guarded(
        repository,
        existing.id,
        &[PixInfractionState::OpenConfirmed]
    ));

    infraction.analysis_result = Some(notification.analysis_result);
    infraction.analysis_details = notification.analysis_details;
    infraction.status = PixInfractionStatus::Closed;
    infraction.transition(PixInfractionState::CloseConfirmed)?;
    let infraction = repository.update(&infraction).await?;
    let events = emit(names::CLOSE_CONFIRMED, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// Cancels an infraction we reported. One never sent to the scheme is
/// canceled locally; an open one goes through CancelPending.
pub async fn cancel_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(
        repository,
        id,
        &[PixInfractionState::NewConfirmed, PixInfractionState::OpenConfirmed]
    ));

    let event = if infraction.state == PixInfractionState::NewConfirmed {
        infraction.status = PixInfractionStatus::Canceled;
        infraction.transition(PixInfractionState::CancelConfirmed)?;
        names::CANCEL_CONFIRMED
    } else {
        infraction.transition(PixInfractionState::CancelPending)?;
        names::CANCEL_PENDING
    };
    let infraction = repository.update(&infraction).await?;
    let events = emit(event, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// CancelPending -> CancelConfirmed once the scheme withdrew the infraction.
pub async fn handle_cancel_pending_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(repository, id, &[PixInfractionState::CancelPending]));

    let Some(psp_id) = infraction.infraction_psp_id.clone() else {
        return Err(DomainError::Validation(format!("infraction {} was never opened", id)).into());
    };
    if let Err(e) = ctx.gateways.pix.cancel_infraction(&psp_id).await {
        return fail(ctx, infraction, &e).await;
    }

    infraction.status = PixInfractionStatus::Canceled;
    infraction.transition(PixInfractionState::CancelConfirmed)?;
    let infraction = repository.update(&infraction).await?;
    let events = emit(names::CANCEL_CONFIRMED, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

/// Any pending state -> Error. The ticket is told, failures absorbed.
pub async fn handle_revert_infraction(ctx: &SagaContext, id: Uuid) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(
        repository,
        id,
        &[
            PixInfractionState::OpenPending,
            PixInfractionState::ReceivePending,
            PixInfractionState::ClosePending,
            PixInfractionState::CancelPending,
        ]
    ));

    infraction.transition(PixInfractionState::Error)?;
    let infraction = repository.update(&infraction).await?;
    let comment = infraction.failed.as_ref().map(|failed| failed.to_string());
    update_issue(ctx, &infraction, comment).await;
    warn!(entity_id = %id, failed = ?infraction.failed, "infraction reverted");
    let events = emit(names::ERROR, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

async fn move_to(
    ctx: &SagaContext,
    id: Uuid,
    expected: &[PixInfractionState],
    next: PixInfractionState,
    event: &str,
) -> SagaResult<PixInfraction> {
    let repository = ctx.repositories.infractions.as_ref();
    let mut infraction = guarded!(load_guarded(repository, id, expected));
    infraction.transition(next)?;
    let infraction = repository.update(&infraction).await?;
    let events = emit(event, &infraction)?;
    Ok(Transition::Applied {
        entity: infraction,
        events,
    })
}

async fn fail(
    ctx: &SagaContext,
    mut infraction: PixInfraction,
    error: &crate::error::GatewayError,
) -> SagaResult<PixInfraction> {
    warn!(entity_id = %infraction.id, state = %infraction.state, error = %error, "infraction step failed");
    let failed = gateway_failure(ctx.translator.as_ref(), error);
    infraction.failed = Some(failed.clone());
    infraction.touch();
    let infraction = ctx.repositories.infractions.update(&infraction).await?;
    let events = emit(names::REVERTED, &infraction)?;
    Ok(Transition::Failed {
        entity_id: infraction.id,
        failed,
        events,
    })
}

async fn update_issue(ctx: &SagaContext, infraction: &PixInfraction, comment: Option<String>) {
    let Some(issue_id) = infraction.issue_id.as_deref() else {
        return;
    };
    let update = IssueUpdate {
        status: infraction.state.to_string(),
        comment,
    };
    if let Err(e) = ctx.gateways.issues.update_issue(issue_id, &update).await {
        warn!(entity_id = %infraction.id, issue_id, error = %e, "failed to update infraction issue");
    }
}
