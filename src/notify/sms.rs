//! SMS delivery with carrier failover. Each record carries its provider chain;
//! a failed attempt hands the same record to the next carrier's topic, and the
//! last failure sends it to dead letter.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{NotificationState, SagaEntity, Sms};
use crate::error::{DomainError, GatewayError, SagaError};
use crate::events::{names, sms_provider_topic, Domain, OutboundEvent};
use crate::ports::{EntityRepository, SmsMessage};
use crate::saga::failure::gateway_failure;
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSmsRequest {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub phone_number: String,
    pub body: String,
    pub idempotency_token: Option<String>,
}

/// Event addressed to the carrier currently responsible for the record.
fn provider_event(sms: &Sms) -> Result<Option<OutboundEvent>, SagaError> {
    let Some(provider) = sms.current_provider() else {
        return Ok(None);
    };
    Ok(Some(OutboundEvent::new(
        sms_provider_topic(provider),
        sms.id.to_string(),
        serde_json::to_value(sms)?,
    )))
}

pub async fn create_sms(ctx: &SagaContext, request: CreateSmsRequest) -> SagaResult<Sms> {
    let repository = ctx.repositories.sms.as_ref();
    if repository.get_by_id(request.id).await?.is_some() {
        return Ok(Transition::Ignored {
            reason: format!("sms {} already exists", request.id),
        });
    }

    let route = ctx
        .settings
        .sms
        .plan(
            ctx.cache.as_ref(),
            &request.phone_number,
            request.idempotency_token.as_deref(),
        )
        .await;
    if route.is_empty() {
        return Err(DomainError::Validation("no sms provider configured".to_string()).into());
    }

    let now = Utc::now();
    let sms = Sms {
        id: request.id,
        user_id: request.user_id,
        phone_number: request.phone_number,
        body: request.body,
        idempotency_token: request.idempotency_token,
        route,
        attempt: 0,
        state: NotificationState::Pending,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let sms = repository.create(&sms).await?;
    info!(entity_id = %sms.id, provider = ?sms.current_provider(), "sms queued");
    let events = provider_event(&sms)?.into_iter().collect();
    Ok(Transition::Applied { entity: sms, events })
}

/// Delivers through `provider`. The record is claimed with a compare-and-set
/// so a redelivered message never sends twice.
pub async fn handle_send_sms(ctx: &SagaContext, id: Uuid, provider: &str) -> SagaResult<Sms> {
    let repository = ctx.repositories.sms.as_ref();
    let mut sms = guarded!(load_guarded(repository, id, &[NotificationState::Pending]));

    if sms.current_provider() != Some(provider) {
        return Ok(Transition::Ignored {
            reason: format!(
                "sms {} is routed to {:?}, not {}",
                id,
                sms.current_provider(),
                provider
            ),
        });
    }
    if !repository
        .update_state_if(id, NotificationState::Pending, NotificationState::Processing)
        .await?
    {
        return Ok(Transition::Ignored {
            reason: format!("sms {} already claimed", id),
        });
    }
    sms.set_state(NotificationState::Processing);

    let message = SmsMessage {
        id: sms.id,
        phone_number: sms.phone_number.clone(),
        body: sms.body.clone(),
    };
    let result = match ctx.gateways.sms.get(provider) {
        Some(gateway) => gateway.send_sms(&message).await,
        None => Err(GatewayError::Unavailable(format!("sms provider {} is not configured", provider))),
    };

    match result {
        Ok(()) => {
            sms.failed = None;
            sms.transition(NotificationState::Sent)?;
            let sms = repository.update(&sms).await?;
            info!(entity_id = %id, provider, "sms sent");
            let events = vec![OutboundEvent::entity(Domain::Sms, names::SENT, &sms)?];
            Ok(Transition::Applied { entity: sms, events })
        }
        Err(e) => {
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            sms.failed = Some(failed.clone());
            let events = if sms.next_provider().is_some() {
                warn!(entity_id = %id, provider, error = %e, next = ?sms.next_provider(), "sms provider failed, failing over");
                sms.attempt += 1;
                sms.transition(NotificationState::Pending)?;
                let sms = repository.update(&sms).await?;
                provider_event(&sms)?.into_iter().collect()
            } else {
                error!(entity_id = %id, provider, error = %e, "sms exhausted every provider");
                sms.transition(NotificationState::DeadLetter)?;
                let sms = repository.update(&sms).await?;
                vec![OutboundEvent::entity(Domain::Sms, names::DEAD_LETTER, &sms)?]
            };
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events,
            })
        }
    }
}

/// Releases a record stuck in Processing (the worker died mid-send) and hands
/// it back to its current provider.
pub async fn requeue_stuck_sms(ctx: &SagaContext, id: Uuid) -> SagaResult<Sms> {
    let repository = ctx.repositories.sms.as_ref();
    let mut sms = guarded!(load_guarded(repository, id, &[NotificationState::Processing]));
    sms.transition(NotificationState::Pending)?;
    let sms = repository.update(&sms).await?;
    warn!(entity_id = %id, provider = ?sms.current_provider(), "stuck sms requeued");
    let events = provider_event(&sms)?.into_iter().collect();
    Ok(Transition::Applied { entity: sms, events })
}

/// Re-emits the provider topic of a record still Pending.
pub async fn resend_pending_sms(ctx: &SagaContext, id: Uuid) -> SagaResult<Sms> {
    let repository = ctx.repositories.sms.as_ref();
    let sms = guarded!(load_guarded(repository, id, &[NotificationState::Pending]));
    let events: Vec<OutboundEvent> = provider_event(&sms)?.into_iter().collect();
    Ok(Transition::Emitted { entity_id: id, events })
}
