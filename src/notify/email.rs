//! E-mail delivery through the SMTP relay. Failed attempts go back to Pending
//! until the configured maximum, then the record fails for good.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Email, NotificationState, SagaEntity};
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{EmailMessage, EntityRepository};
use crate::saga::failure::gateway_failure;
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailRequest {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub to: String,
    pub from: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub html: bool,
}

pub async fn create_email(ctx: &SagaContext, request: CreateEmailRequest) -> SagaResult<Email> {
    let repository = ctx.repositories.emails.as_ref();
    if repository.get_by_id(request.id).await?.is_some() {
        return Ok(Transition::Ignored {
            reason: format!("email {} already exists", request.id),
        });
    }

    let now = Utc::now();
    let email = Email {
        id: request.id,
        user_id: request.user_id,
        to: request.to,
        from: request.from,
        title: request.title,
        body: request.body,
        html: request.html,
        attempts: 0,
        state: NotificationState::Pending,
        failed: None,
        created_at: now,
        updated_at: now,
    };
    let email = repository.create(&email).await?;
    let events = vec![OutboundEvent::entity(Domain::Email, names::PENDING, &email)?];
    Ok(Transition::Applied {
        entity: email,
        events,
    })
}

pub async fn handle_pending_email(ctx: &SagaContext, id: Uuid) -> SagaResult<Email> {
    let repository = ctx.repositories.emails.as_ref();
    let mut email = guarded!(load_guarded(repository, id, &[NotificationState::Pending]));

    if !repository
        .update_state_if(id, NotificationState::Pending, NotificationState::Processing)
        .await?
    {
        return Ok(Transition::Ignored {
            reason: format!("email {} already claimed", id),
        });
    }
    email.set_state(NotificationState::Processing);

    let message = EmailMessage {
        id: email.id,
        to: email.to.clone(),
        from: email.from.clone(),
        title: email.title.clone(),
        body: email.body.clone(),
        html: email.html,
    };
    email.attempts += 1;

    match ctx.gateways.smtp.send_email(&message).await {
        Ok(()) => {
            email.failed = None;
            email.transition(NotificationState::Sent)?;
            let email = repository.update(&email).await?;
            info!(entity_id = %id, attempts = email.attempts, "email sent");
            let events = vec![OutboundEvent::entity(Domain::Email, names::SENT, &email)?];
            Ok(Transition::Applied {
                entity: email,
                events,
            })
        }
        Err(e) => {
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            email.failed = Some(failed.clone());
            let events = if email.attempts >= ctx.settings.email_max_attempts {
                warn!(entity_id = %id, attempts = email.attempts, error = %e, "email failed permanently");
                email.transition(NotificationState::Failed)?;
                let email = repository.update(&email).await?;
                vec![OutboundEvent::entity(Domain::Email, names::FAILED, &email)?]
            } else {
                warn!(entity_id = %id, attempts = email.attempts, error = %e, "email attempt failed");
                email.transition(NotificationState::Pending)?;
                repository.update(&email).await?;
                Vec::new()
            };
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events,
            })
        }
    }
}

/// Processing -> Pending for a record whose worker died mid-send.
pub async fn requeue_stuck_email(ctx: &SagaContext, id: Uuid) -> SagaResult<Email> {
    let repository = ctx.repositories.emails.as_ref();
    let mut email = guarded!(load_guarded(repository, id, &[NotificationState::Processing]));
    email.transition(NotificationState::Pending)?;
    let email = repository.update(&email).await?;
    let events = vec![OutboundEvent::entity(Domain::Email, names::PENDING, &email)?];
    Ok(Transition::Applied {
        entity: email,
        events,
    })
}
