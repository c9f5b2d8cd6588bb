//! Fraud markings: those we register at the scheme against a person, and
//! those the scheme reports to us.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    FraudType, PersonType, PixFraudDetection, PixFraudDetectionState, SagaEntity,
};
use crate::error::{DomainError, GatewayError, SagaError};
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EntityRepository, FraudDetectionRequest, IssueKind, IssueRequest, IssueUpdate};
use crate::saga::failure::gateway_failure;
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

/// States in which a registration still counts for the subject.
const ACTIVE_REGISTRATION: &[PixFraudDetectionState] = &[
    PixFraudDetectionState::RegisterPending,
    PixFraudDetectionState::RegisterConfirmed,
    PixFraudDetectionState::CancelRegisteredPending,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFraudDetectionRequest {
    pub id: Uuid,
    pub person_type: PersonType,
    pub document: String,
    pub fraud_type: FraudType,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveFraudDetectionRequest {
    pub id: Uuid,
    pub external_id: String,
    pub person_type: PersonType,
    pub document: String,
    pub fraud_type: FraudType,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReceivedFraudDetectionRequest {
    pub external_id: String,
}

fn emit(event: &str, fraud: &PixFraudDetection) -> Result<Vec<OutboundEvent>, SagaError> {
    Ok(vec![OutboundEvent::entity(Domain::FraudDetection, event, fraud)?])
}

pub async fn register_fraud_detection(
    ctx: &SagaContext,
    request: RegisterFraudDetectionRequest,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    if repository.get_by_id(request.id).await?.is_some() {
        return Ok(Transition::Ignored {
            reason: format!("pix_fraud_detection {} already exists", request.id),
        });
    }

    let active = repository
        .find_by_field(&["document"], &request.document)
        .await?
        .into_iter()
        .find(|fraud| {
            ACTIVE_REGISTRATION.contains(&fraud.state)
                && fraud.same_subject(request.person_type, &request.document, request.fraud_type)
        });
    if let Some(existing) = active {
        return Err(DomainError::AlreadyExists {
            entity: "pix_fraud_detection",
            id: existing.id.to_string(),
        }
        .into());
    }

    let now = Utc::now();
    let fraud = PixFraudDetection {
        id: request.id,
        external_id: None,
        issue_id: None,
        person_type: request.person_type,
        document: request.document,
        fraud_type: request.fraud_type,
        key: request.key,
        status: None,
        state: PixFraudDetectionState::RegisterPending,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let fraud = repository.create(&fraud).await?;
    info!(entity_id = %fraud.id, fraud_type = ?fraud.fraud_type, "fraud detection registered");
    let events = emit(names::REGISTER_PENDING, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

/// RegisterPending -> RegisterConfirmed once the scheme stored the marking.
pub async fn handle_register_pending_fraud_detection(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let mut fraud = guarded!(load_guarded(repository, id, &[PixFraudDetectionState::RegisterPending]));

    let request = FraudDetectionRequest {
        id: fraud.id,
        person_type: fraud.person_type,
        document: fraud.document.clone(),
        fraud_type: fraud.fraud_type,
        key: fraud.key.clone(),
    };
    match ctx.gateways.pix.create_fraud_detection(&request).await {
        Ok(external_id) => {
            fraud.external_id = Some(external_id);
            fraud.confirm(PixFraudDetectionState::RegisterConfirmed)?;
            let fraud = repository.update(&fraud).await?;
            let events = emit(names::REGISTER_CONFIRMED, &fraud)?;
            Ok(Transition::Applied {
                entity: fraud,
                events,
            })
        }
        Err(e) => fail(ctx, fraud, &e).await,
    }
}

/// RegisterConfirmed -> CancelRegisteredPending.
pub async fn cancel_registered_fraud_detection(ctx: &SagaContext, id: Uuid) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let mut fraud = guarded!(load_guarded(repository, id, &[PixFraudDetectionState::RegisterConfirmed]));
    fraud.confirm(PixFraudDetectionState::CancelRegisteredPending)?;
    let fraud = repository.update(&fraud).await?;
    let events = emit(names::CANCEL_REGISTERED_PENDING, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

pub async fn handle_cancel_registered_pending_fraud_detection(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let mut fraud = guarded!(load_guarded(
        repository,
        id,
        &[PixFraudDetectionState::CancelRegisteredPending]
    ));

    if let Some(external_id) = fraud.external_id.clone() {
        if let Err(e) = ctx.gateways.pix.cancel_fraud_detection(&external_id).await {
            return fail(ctx, fraud, &e).await;
        }
    }

    fraud.confirm(PixFraudDetectionState::CancelRegisteredConfirmed)?;
    let fraud = repository.update(&fraud).await?;
    let events = emit(names::CANCEL_REGISTERED_CONFIRMED, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

/// Records a marking the scheme reported against one of our users.
pub async fn receive_fraud_detection(
    ctx: &SagaContext,
    request: ReceiveFraudDetectionRequest,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    if repository.get_by_id(request.id).await?.is_some()
        || repository
            .find_one_by_field(&["externalId"], &request.external_id)
            .await?
            .is_some()
    {
        return Ok(Transition::Ignored {
            reason: format!("fraud detection {} already received", request.external_id),
        });
    }

    let now = Utc::now();
    let fraud = PixFraudDetection {
        id: request.id,
        external_id: Some(request.external_id),
        issue_id: None,
        person_type: request.person_type,
        document: request.document,
        fraud_type: request.fraud_type,
        key: request.key,
        status: None,
        state: PixFraudDetectionState::ReceivedPending,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let fraud = repository.create(&fraud).await?;
    info!(entity_id = %fraud.id, fraud_type = ?fraud.fraud_type, "fraud detection received");
    let events = emit(names::RECEIVED_PENDING, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

/// ReceivedPending -> ReceivedConfirmed once an analysis ticket exists.
pub async fn handle_received_pending_fraud_detection(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let mut fraud = guarded!(load_guarded(repository, id, &[PixFraudDetectionState::ReceivedPending]));

    let request = IssueRequest {
        kind: IssueKind::FraudDetection,
        entity_id: fraud.id,
        transaction: None,
        summary: format!("Pix fraud detection {:?}", fraud.fraud_type),
        description: fraud.external_id.clone(),
    };
    match ctx.gateways.issues.create_issue(&request).await {
        Ok(issue_id) => {
            fraud.issue_id = Some(issue_id);
            fraud.confirm(PixFraudDetectionState::ReceivedConfirmed)?;
            let fraud = repository.update(&fraud).await?;
            let events = emit(names::RECEIVED_CONFIRMED, &fraud)?;
            Ok(Transition::Applied {
                entity: fraud,
                events,
            })
        }
        Err(e) => fail(ctx, fraud, &e).await,
    }
}

/// ReceivedConfirmed -> CancelReceivedPending when the scheme withdraws a
/// marking it reported.
pub async fn cancel_received_fraud_detection(
    ctx: &SagaContext,
    request: CancelReceivedFraudDetectionRequest,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let Some(existing) = repository
        .find_one_by_field(&["externalId"], &request.external_id)
        .await?
    else {
        return Ok(Transition::Ignored {
            reason: format!("fraud detection {} not found", request.external_id),
        });
    };
    let mut fraud = guarded!(load_guarded(
        repository,
        existing.id,
        &[PixFraudDetectionState::ReceivedConfirmed]
    ));

    fraud.confirm(PixFraudDetectionState::CancelReceivedPending)?;
    let fraud = repository.update(&fraud).await?;
    let events = emit(names::CANCEL_RECEIVED_PENDING, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

pub async fn handle_cancel_received_pending_fraud_detection(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let mut fraud = guarded!(load_guarded(
        repository,
        id,
        &[PixFraudDetectionState::CancelReceivedPending]
    ));

    if let Some(issue_id) = fraud.issue_id.clone() {
        let update = IssueUpdate {
            status: PixFraudDetectionState::CancelReceivedConfirmed.to_string(),
            comment: Some("Fraud marking withdrawn by the scheme".to_string()),
        };
        if let Err(e) = ctx.gateways.issues.update_issue(&issue_id, &update).await {
            return fail(ctx, fraud, &e).await;
        }
    }

    fraud.confirm(PixFraudDetectionState::CancelReceivedConfirmed)?;
    let fraud = repository.update(&fraud).await?;
    let events = emit(names::CANCEL_RECEIVED_CONFIRMED, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

/// Pending states -> Failed.
pub async fn handle_revert_fraud_detection(ctx: &SagaContext, id: Uuid) -> SagaResult<PixFraudDetection> {
    let repository = ctx.repositories.fraud_detections.as_ref();
    let mut fraud = guarded!(load_guarded(
        repository,
        id,
        &[
            PixFraudDetectionState::RegisterPending,
            PixFraudDetectionState::CancelRegisteredPending,
            PixFraudDetectionState::ReceivedPending,
            PixFraudDetectionState::CancelReceivedPending,
        ]
    ));

    fraud.transition(PixFraudDetectionState::Failed)?;
    let fraud = repository.update(&fraud).await?;
    warn!(entity_id = %id, failed = ?fraud.failed, "fraud detection reverted");
    let events = emit(names::FAILED, &fraud)?;
    Ok(Transition::Applied {
        entity: fraud,
        events,
    })
}

async fn fail(
    ctx: &SagaContext,
    mut fraud: PixFraudDetection,
    error: &GatewayError,
) -> SagaResult<PixFraudDetection> {
    warn!(entity_id = %fraud.id, state = %fraud.state, error = %error, "fraud detection step failed");
    let failed = gateway_failure(ctx.translator.as_ref(), error);
    fraud.failed = Some(failed.clone());
    fraud.touch();
    let fraud = ctx.repositories.fraud_detections.update(&fraud).await?;
    let events = emit(names::REVERTED, &fraud)?;
    Ok(Transition::Failed {
        entity_id: fraud.id,
        failed,
        events,
    })
}
