//! Generic saga for transfers we send to the payment scheme: payments and the
//! three kinds of devolution. Pending -> Waiting once the scheme accepted the
//! order, Waiting -> Confirmed on completion. A refusal moves the transfer to
//! Failed before `REVERTED` is emitted, so a redelivered `PENDING` never reaches
//! the scheme twice; the revert handler then gives the ledger operation back
//! exactly once. When the ledger cannot be compensated the transfer is parked
//! in DeadLetter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chargeback::resolve_chargeback;
use crate::domain::{
    FailedRecord, OperationRef, PixDevolution, PixRefundDevolution, SagaEntity, SagaState,
    TransferState, WarningPixDevolution,
};
use crate::events::{names, Domain, OutboundEvent};
use crate::ports::{
    EntityRepository, OperationRequest, TransferKind, TransferOrder, TransferReceipt,
    TransferStatus,
};
use crate::saga::failure::{gateway_failure, DEFAULT_EXCEPTIONS};
use crate::saga::{guarded, load_guarded, SagaContext, SagaResult, Transition};

/// Scheme confirmation of a transfer we sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub id: Uuid,
    pub end_to_end_id: Option<String>,
}

/// Scheme rejection of a transfer already accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargebackPayload {
    pub id: Uuid,
    pub reason: String,
}

pub trait OutboundTransfer: SagaEntity {
    const DOMAIN: Domain;

    fn repository(ctx: &SagaContext) -> &dyn EntityRepository<Self>;

    fn owner_id(&self) -> Uuid;

    fn amount(&self) -> i64;

    fn transfer_order(&self) -> TransferOrder;

    fn operation(&self) -> Option<OperationRef>;

    fn set_operation(&mut self, operation: OperationRef);

    fn external_id(&self) -> Option<&str>;

    fn failed(&self) -> Option<&FailedRecord>;

    fn record_receipt(&mut self, receipt: TransferReceipt);

    fn record_confirmation(&mut self, end_to_end_id: Option<String>);

    fn record_failure(&mut self, failed: FailedRecord);

    fn record_chargeback(&mut self, reason: &str, failed: FailedRecord);

    fn reverted_at(&self) -> Option<DateTime<Utc>>;

    fn record_revert(&mut self, at: DateTime<Utc>);
}

/// Reserves the ledger debit and persists a new transfer. Replaying the same
/// command is a no-op. The emitted topic follows the initial state, e.g.
/// `PAYMENT.PENDING` or `PAYMENT.SCHEDULED`.
pub async fn create_transfer<E>(
    ctx: &SagaContext,
    mut entity: E,
    tag: &str,
    description: String,
) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let id = entity.id();
    if repository.get_by_id(id).await?.is_some() {
        return Ok(Transition::Ignored {
            reason: format!("{} {} already exists", E::KIND, id),
        });
    }

    let request = OperationRequest {
        id,
        tag: tag.to_string(),
        owner_id: entity.owner_id(),
        value: entity.amount(),
        description,
    };
    match ctx.gateways.operations.create_operation(&request).await {
        Ok(operation) => {
            entity.set_operation(operation);
            let entity = repository.create(&entity).await?;
            info!(entity_id = %id, kind = E::KIND, state = %entity.state(), "transfer created");
            let events = vec![OutboundEvent::entity(E::DOMAIN, entity.state().as_str(), &entity)?];
            Ok(Transition::Applied { entity, events })
        }
        Err(e) => {
            warn!(entity_id = %id, kind = E::KIND, error = %e, "ledger refused transfer debit");
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            entity.record_failure(failed.clone());
            let events = vec![OutboundEvent::entity(E::DOMAIN, names::FAILED, &entity)?];
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events,
            })
        }
    }
}

/// Pending -> Waiting: submits the order to the scheme. A refusal moves the
/// entity to Failed with its failure recorded and emits `<DOMAIN>.REVERTED`.
pub async fn handle_pending<E>(ctx: &SagaContext, id: Uuid) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let mut entity = guarded!(load_guarded(
        repository,
        id,
        &[<E::State as TransferState>::PENDING]
    ));

    match ctx.gateways.pix.send_transfer(&entity.transfer_order()).await {
        Ok(receipt) => {
            entity.record_receipt(receipt);
            entity.transition(<E::State as TransferState>::WAITING)?;
            let entity = repository.update(&entity).await?;
            info!(entity_id = %id, kind = E::KIND, "transfer accepted by scheme");
            let events = vec![OutboundEvent::entity(E::DOMAIN, names::WAITING, &entity)?];
            Ok(Transition::Applied { entity, events })
        }
        Err(e) => {
            warn!(entity_id = %id, kind = E::KIND, error = %e, "scheme refused transfer");
            let failed = gateway_failure(ctx.translator.as_ref(), &e);
            entity.record_failure(failed.clone());
            entity.transition(<E::State as TransferState>::FAILED)?;
            let entity = repository.update(&entity).await?;
            let events = vec![OutboundEvent::entity(E::DOMAIN, names::REVERTED, &entity)?];
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events,
            })
        }
    }
}

/// Waiting -> Confirmed: settles the ledger operation. A ledger failure leaves
/// the entity in Waiting for the reconciliation job.
pub async fn handle_waiting<E>(
    ctx: &SagaContext,
    id: Uuid,
    end_to_end_id: Option<String>,
) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let mut entity = guarded!(load_guarded(
        repository,
        id,
        &[<E::State as TransferState>::WAITING]
    ));

    if let Some(operation) = entity.operation() {
        if let Err(e) = ctx.gateways.operations.accept_operation(operation.id).await {
            warn!(entity_id = %id, kind = E::KIND, error = %e, "failed to accept ledger operation");
            return Ok(Transition::Failed {
                entity_id: id,
                failed: gateway_failure(ctx.translator.as_ref(), &e),
                events: Vec::new(),
            });
        }
    }

    entity.record_confirmation(end_to_end_id);
    entity.transition(<E::State as TransferState>::CONFIRMED)?;
    let entity = repository.update(&entity).await?;
    info!(entity_id = %id, kind = E::KIND, "transfer confirmed");
    let events = vec![OutboundEvent::entity(E::DOMAIN, names::CONFIRMED, &entity)?];
    Ok(Transition::Applied { entity, events })
}

/// Failed: returns the reserved amount to the user, once per transfer. When
/// the ledger cannot revert, emits `<DOMAIN>.DEAD_LETTER` instead.
pub async fn handle_revert<E>(ctx: &SagaContext, id: Uuid) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let mut entity = guarded!(load_guarded(
        repository,
        id,
        &[<E::State as TransferState>::FAILED]
    ));
    if entity.reverted_at().is_some() {
        return Ok(Transition::Ignored {
            reason: format!("{} {} already reverted", E::KIND, id),
        });
    }

    let failed = match entity.failed() {
        Some(failed) => failed.clone(),
        None => FailedRecord::new(
            "TRANSFER_REVERTED",
            ctx.translator.translate(DEFAULT_EXCEPTIONS, "TRANSFER_REVERTED", &[]),
        ),
    };

    if let Some(transition) = revert_or_dead_letter(ctx, &entity, &failed).await? {
        return Ok(transition);
    }

    entity.record_failure(failed);
    entity.record_revert(Utc::now());
    entity.touch();
    let entity = repository.update(&entity).await?;
    info!(entity_id = %id, kind = E::KIND, "transfer reverted");
    let events = vec![OutboundEvent::entity(E::DOMAIN, names::FAILED, &entity)?];
    Ok(Transition::Applied { entity, events })
}

/// Waiting -> Failed after the scheme rejected a transfer it had accepted.
pub async fn handle_chargeback<E>(ctx: &SagaContext, id: Uuid, reason: &str) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let mut entity = guarded!(load_guarded(
        repository,
        id,
        &[<E::State as TransferState>::WAITING]
    ));

    let exception = resolve_chargeback(reason);
    let failed = exception.to_failed(ctx.translator.as_ref());
    info!(entity_id = %id, kind = E::KIND, reason, exception = exception.name, "chargeback received");
    entity.record_chargeback(reason, failed.clone());

    if let Some(transition) = revert_or_dead_letter(ctx, &entity, &failed).await? {
        entity.touch();
        repository.update(&entity).await?;
        return Ok(transition);
    }

    entity.record_revert(Utc::now());
    entity.transition(<E::State as TransferState>::FAILED)?;
    let entity = repository.update(&entity).await?;
    let events = vec![OutboundEvent::entity(E::DOMAIN, names::FAILED, &entity)?];
    Ok(Transition::Applied { entity, events })
}

/// Marks a transfer that could not be compensated. Needs manual remediation.
pub async fn handle_dead_letter<E>(ctx: &SagaContext, id: Uuid) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let mut entity = guarded!(load_guarded(
        repository,
        id,
        &[
            <E::State as TransferState>::WAITING,
            <E::State as TransferState>::FAILED
        ]
    ));
    if entity.reverted_at().is_some() {
        return Ok(Transition::Ignored {
            reason: format!("{} {} already reverted", E::KIND, id),
        });
    }

    entity.transition(<E::State as TransferState>::DEAD_LETTER)?;
    let entity = repository.update(&entity).await?;
    error!(
        entity_id = %id,
        kind = E::KIND,
        failed = ?entity.failed(),
        "transfer moved to dead letter"
    );
    Ok(Transition::Applied {
        entity,
        events: Vec::new(),
    })
}

/// Polls the scheme for a transfer stuck in Waiting and re-emits the matching
/// completion event, or moves it to Failed and emits the revert event.
pub async fn sync_waiting<E>(ctx: &SagaContext, id: Uuid) -> SagaResult<E>
where
    E: OutboundTransfer,
    E::State: TransferState,
{
    let repository = E::repository(ctx);
    let mut entity = guarded!(load_guarded(
        repository,
        id,
        &[<E::State as TransferState>::WAITING]
    ));

    let Some(external_id) = entity.external_id().map(str::to_string) else {
        return Ok(Transition::Ignored {
            reason: format!("{} {} has no external id", E::KIND, id),
        });
    };

    match ctx.gateways.pix.get_transfer(&external_id).await {
        Ok(TransferStatus::Processing) => Ok(Transition::Ignored {
            reason: format!("{} {} still processing", E::KIND, id),
        }),
        Ok(TransferStatus::Completed { end_to_end_id }) => {
            let payload = CompletionPayload { id, end_to_end_id };
            let events = vec![OutboundEvent::new(
                E::DOMAIN.topic(names::COMPLETE),
                id.to_string(),
                serde_json::to_value(payload)?,
            )];
            Ok(Transition::Emitted {
                entity_id: id,
                events,
            })
        }
        Ok(TransferStatus::Failed { code, message }) => {
            let failed = FailedRecord::new(code, message);
            entity.record_failure(failed.clone());
            entity.transition(<E::State as TransferState>::FAILED)?;
            let entity = repository.update(&entity).await?;
            let events = vec![OutboundEvent::entity(E::DOMAIN, names::REVERTED, &entity)?];
            Ok(Transition::Failed {
                entity_id: id,
                failed,
                events,
            })
        }
        Err(e) => {
            warn!(entity_id = %id, kind = E::KIND, error = %e, "failed to poll transfer status");
            Ok(Transition::Failed {
                entity_id: id,
                failed: gateway_failure(ctx.translator.as_ref(), &e),
                events: Vec::new(),
            })
        }
    }
}

/// Reverts the ledger operation. `Some` means the revert failed and the
/// returned transition routes the entity to dead letter.
async fn revert_or_dead_letter<E>(
    ctx: &SagaContext,
    entity: &E,
    failed: &FailedRecord,
) -> Result<Option<Transition<E>>, crate::error::SagaError>
where
    E: OutboundTransfer,
{
    let Some(operation) = entity.operation() else {
        return Ok(None);
    };
    match ctx.gateways.operations.revert_operation(operation.id).await {
        Ok(()) => Ok(None),
        Err(e) => {
            error!(
                entity_id = %entity.id(),
                kind = E::KIND,
                operation_id = %operation.id,
                error = %e,
                "failed to revert ledger operation"
            );
            let events = vec![OutboundEvent::entity(E::DOMAIN, names::DEAD_LETTER, entity)?];
            Ok(Some(Transition::Failed {
                entity_id: entity.id(),
                failed: failed.clone(),
                events,
            }))
        }
    }
}

macro_rules! devolution_transfer {
    ($entity:ty, $domain:expr, $repository:ident, |$this:ident| $description:expr) => {
        impl OutboundTransfer for $entity {
            const DOMAIN: Domain = $domain;

            fn repository(ctx: &SagaContext) -> &dyn EntityRepository<Self> {
                ctx.repositories.$repository.as_ref()
            }

            fn owner_id(&self) -> Uuid {
                self.user_id
            }

            fn amount(&self) -> i64 {
                self.amount
            }

            fn transfer_order(&self) -> TransferOrder {
                let $this = self;
                TransferOrder {
                    id: $this.id,
                    kind: TransferKind::Devolution,
                    amount: $this.amount,
                    description: $description,
                    beneficiary: None,
                    original_end_to_end_id: Some($this.original_end_to_end_id.clone()),
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
    };
}

devolution_transfer!(PixDevolution, Domain::Devolution, devolutions, |devolution| devolution
    .description
    .clone());
devolution_transfer!(
    PixRefundDevolution,
    Domain::RefundDevolution,
    refund_devolutions,
    |_devolution| None
);
devolution_transfer!(
    WarningPixDevolution,
    Domain::WarningDevolution,
    warning_devolutions,
    |_devolution| None
);
