//! Routes bus messages to saga controllers and publishes the events they
//! return, carrying the inbound request id forward.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{names, Domain, EntityRef, EventEnvelope, OutboundEvent};
use crate::notify::{email, sms};
use crate::ports::EventEmitter;
use crate::saga::outbound::{ChargebackPayload, CompletionPayload};
use crate::saga::{
    deposit, devolution, devolution_received, fraud_detection, infraction, payment, refund,
    warning_deposit, warning_devolution, SagaContext, Transition,
};
use crate::error::SagaError;
use crate::services::reconciliation::{ReconciliationJob, ReconciliationReport, ReconciliationSettings, Reconciler};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled { label: &'static str, published: usize },
    /// No controller listens on the topic.
    Unrouted,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundDevolutionRef {
    refund_id: Uuid,
}

struct Routed {
    label: &'static str,
    events: Vec<OutboundEvent>,
}

impl<E> From<Transition<E>> for Routed {
    fn from(transition: Transition<E>) -> Self {
        Routed {
            label: transition.label(),
            events: transition.into_events(),
        }
    }
}

fn payload<T: DeserializeOwned>(topic: &str, envelope: &EventEnvelope) -> Result<T, SagaError> {
    serde_json::from_value(envelope.value.clone()).map_err(|source| SagaError::Payload {
        topic: topic.to_string(),
        source,
    })
}

fn entity_id(topic: &str, envelope: &EventEnvelope) -> Result<Uuid, SagaError> {
    payload::<EntityRef>(topic, envelope).map(|reference| reference.id)
}

pub struct SagaDispatcher {
    ctx: SagaContext,
    emitter: Arc<dyn EventEmitter>,
    reconciliation: ReconciliationSettings,
}

impl SagaDispatcher {
    pub fn new(
        ctx: SagaContext,
        emitter: Arc<dyn EventEmitter>,
        reconciliation: ReconciliationSettings,
    ) -> Self {
        Self {
            ctx,
            emitter,
            reconciliation,
        }
    }

    pub fn context(&self) -> &SagaContext {
        &self.ctx
    }

    /// Handles one message and publishes the resulting events.
    pub async fn dispatch(&self, topic: &str, envelope: &EventEnvelope) -> Result<DispatchOutcome, SagaError> {
        let Some(routed) = self.route(topic, envelope).await? else {
            debug!(topic, "no controller for topic");
            return Ok(DispatchOutcome::Unrouted);
        };
        info!(
            topic,
            key = %envelope.key,
            outcome = routed.label,
            events = routed.events.len(),
            "message handled"
        );
        let published = self
            .publish(routed.events, envelope.headers.request_id.clone())
            .await?;
        Ok(DispatchOutcome::Handled {
            label: routed.label,
            published,
        })
    }

    pub async fn publish(&self, events: Vec<OutboundEvent>, request_id: Option<String>) -> Result<usize, SagaError> {
        let count = events.len();
        for event in events {
            let topic = event.topic.clone();
            let envelope = event.into_envelope(request_id.clone());
            self.emitter.emit(&topic, &envelope).await?;
            debug!(topic = %topic, key = %envelope.key, "event published");
        }
        Ok(count)
    }

    /// Runs a reconciliation job and publishes what it produced. Each run gets
    /// its own request id.
    pub async fn reconcile(&self, job: ReconciliationJob, now: DateTime<Utc>) -> Result<ReconciliationReport, SagaError> {
        let reconciler = Reconciler::new(self.ctx.clone(), self.reconciliation);
        let mut report = reconciler.run(job, now).await?;
        let events = std::mem::take(&mut report.events);
        self.publish(events, Some(Uuid::new_v4().to_string())).await?;
        Ok(report)
    }

    async fn route(&self, topic: &str, envelope: &EventEnvelope) -> Result<Option<Routed>, SagaError> {
        let ctx = &self.ctx;
        let Some((domain, event)) = topic.split_once('.') else {
            return Ok(None);
        };

        let routed: Routed = match (domain, event) {
            // payments
            ("PAYMENT", names::CREATE) => payment::create_payment(ctx, payload(topic, envelope)?).await?.into(),
            ("PAYMENT", names::PENDING) => payment::handle_pending_payment(ctx, entity_id(topic, envelope)?).await?.into(),
            ("PAYMENT", names::COMPLETE) => {
                let completion: CompletionPayload = payload(topic, envelope)?;
                payment::handle_waiting_payment(ctx, completion.id, completion.end_to_end_id).await?.into()
            }
            ("PAYMENT", names::REVERTED) => payment::handle_revert_payment(ctx, entity_id(topic, envelope)?).await?.into(),
            ("PAYMENT", names::CHARGEBACK) => {
                let chargeback: ChargebackPayload = payload(topic, envelope)?;
                payment::handle_chargeback_payment(ctx, chargeback.id, &chargeback.reason).await?.into()
            }
            ("PAYMENT", names::DEAD_LETTER) => payment::handle_dead_letter_payment(ctx, entity_id(topic, envelope)?).await?.into(),
            ("PAYMENT", names::CANCEL) => payment::cancel_payment(ctx, entity_id(topic, envelope)?).await?.into(),

            // devolutions of deposits
            ("DEVOLUTION", names::CREATE) => devolution::create_devolution(ctx, payload(topic, envelope)?).await?.into(),
            ("DEVOLUTION", names::PENDING) => devolution::handle_pending_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("DEVOLUTION", names::COMPLETE) => {
                let completion: CompletionPayload = payload(topic, envelope)?;
                devolution::handle_waiting_devolution(ctx, completion.id, completion.end_to_end_id).await?.into()
            }
            ("DEVOLUTION", names::REVERTED) => devolution::handle_revert_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("DEVOLUTION", names::CHARGEBACK) => {
                let chargeback: ChargebackPayload = payload(topic, envelope)?;
                devolution::handle_chargeback_devolution(ctx, chargeback.id, &chargeback.reason).await?.into()
            }
            ("DEVOLUTION", names::DEAD_LETTER) => devolution::handle_dead_letter_devolution(ctx, entity_id(topic, envelope)?).await?.into(),

            // refund devolutions
            ("REFUND_DEVOLUTION", names::PENDING) => refund::handle_pending_refund_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("REFUND_DEVOLUTION", names::COMPLETE) => {
                let completion: CompletionPayload = payload(topic, envelope)?;
                refund::handle_waiting_refund_devolution(ctx, completion.id, completion.end_to_end_id).await?.into()
            }
            ("REFUND_DEVOLUTION", names::REVERTED) => refund::handle_revert_refund_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("REFUND_DEVOLUTION", names::CHARGEBACK) => {
                let chargeback: ChargebackPayload = payload(topic, envelope)?;
                refund::handle_chargeback_refund_devolution(ctx, chargeback.id, &chargeback.reason).await?.into()
            }
            ("REFUND_DEVOLUTION", names::DEAD_LETTER) => refund::handle_dead_letter_refund_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("REFUND_DEVOLUTION", names::CONFIRMED) => {
                let reference: RefundDevolutionRef = payload(topic, envelope)?;
                refund::handle_refund_devolution_confirmed(ctx, reference.refund_id).await?.into()
            }
            ("REFUND_DEVOLUTION", names::FAILED) => {
                let reference: RefundDevolutionRef = payload(topic, envelope)?;
                refund::handle_refund_devolution_failed(ctx, reference.refund_id).await?.into()
            }

            // warning devolutions
            ("WARNING_DEVOLUTION", names::PENDING) => warning_devolution::handle_pending_warning_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("WARNING_DEVOLUTION", names::COMPLETE) => {
                let completion: CompletionPayload = payload(topic, envelope)?;
                warning_devolution::handle_waiting_warning_devolution(ctx, completion.id, completion.end_to_end_id).await?.into()
            }
            ("WARNING_DEVOLUTION", names::REVERTED) => warning_devolution::handle_revert_warning_devolution(ctx, entity_id(topic, envelope)?).await?.into(),
            ("WARNING_DEVOLUTION", names::CHARGEBACK) => {
                let chargeback: ChargebackPayload = payload(topic, envelope)?;
                warning_devolution::handle_chargeback_warning_devolution(ctx, chargeback.id, &chargeback.reason).await?.into()
            }
            ("WARNING_DEVOLUTION", names::DEAD_LETTER) => warning_devolution::handle_dead_letter_warning_devolution(ctx, entity_id(topic, envelope)?).await?.into(),

            // deposits and compliance holds
            ("DEPOSIT", names::RECEIVE) => deposit::receive_deposit(ctx, payload(topic, envelope)?).await?.into(),
            ("DEPOSIT", names::NEW) => deposit::handle_new_deposit(ctx, entity_id(topic, envelope)?).await?.into(),
            ("DEPOSIT", names::FAILED) => deposit::handle_failed_deposit(ctx, entity_id(topic, envelope)?).await?.into(),
            ("WARNING_DEPOSIT", names::CREATED) => warning_deposit::handle_created_warning_deposit(ctx, entity_id(topic, envelope)?).await?.into(),
            ("WARNING_DEPOSIT", names::APPROVE) => warning_deposit::approve_warning_deposit(ctx, entity_id(topic, envelope)?).await?.into(),
            ("WARNING_DEPOSIT", names::REJECT) => warning_deposit::reject_warning_deposit(ctx, entity_id(topic, envelope)?).await?.into(),
            ("WARNING_DEPOSIT", names::APPROVED) => {
                let warning: deposit::WarningDepositRef = payload(topic, envelope)?;
                deposit::handle_approved_warning_deposit(ctx, warning.deposit_id).await?.into()
            }
            ("WARNING_DEPOSIT", names::REJECTED) => deposit::handle_rejected_warning_deposit(ctx, payload(topic, envelope)?).await?.into(),

            // devolutions received
            ("DEVOLUTION_RECEIVED", names::RECEIVE) => devolution_received::receive_devolution(ctx, payload(topic, envelope)?).await?.into(),
            ("DEVOLUTION_RECEIVED", names::READY) => devolution_received::handle_ready_devolution_received(ctx, entity_id(topic, envelope)?).await?.into(),
            ("DEVOLUTION_RECEIVED", names::FAILED) => devolution_received::handle_failed_devolution_received(ctx, entity_id(topic, envelope)?).await?.into(),

            // infractions
            ("INFRACTION", names::CREATE) => infraction::create_infraction(ctx, payload(topic, envelope)?).await?.into(),
            ("INFRACTION", names::OPEN) => infraction::open_infraction(ctx, entity_id(topic, envelope)?).await?.into(),
            ("INFRACTION", names::OPEN_PENDING) => infraction::handle_open_pending_infraction(ctx, entity_id(topic, envelope)?).await?.into(),
            ("INFRACTION", names::RECEIVE) => infraction::receive_infraction(ctx, payload(topic, envelope)?).await?.into(),
            ("INFRACTION", names::RECEIVE_PENDING) => infraction::handle_receive_pending_infraction(ctx, entity_id(topic, envelope)?).await?.into(),
            ("INFRACTION", names::CLOSE) => infraction::close_infraction(ctx, payload(topic, envelope)?).await?.into(),
            ("INFRACTION", names::CLOSE_PENDING) => infraction::handle_close_pending_infraction(ctx, entity_id(topic, envelope)?).await?.into(),
            ("INFRACTION", names::CLOSE_NOTIFICATION) => infraction::handle_close_notification(ctx, payload(topic, envelope)?).await?.into(),
            ("INFRACTION", names::CANCEL) => infraction::cancel_infraction(ctx, entity_id(topic, envelope)?).await?.into(),
            ("INFRACTION", names::CANCEL_PENDING) => infraction::handle_cancel_pending_infraction(ctx, entity_id(topic, envelope)?).await?.into(),
            ("INFRACTION", names::REVERTED) => infraction::handle_revert_infraction(ctx, entity_id(topic, envelope)?).await?.into(),

            // refunds
            ("REFUND", names::RECEIVE) => refund::receive_refund(ctx, payload(topic, envelope)?).await?.into(),
            ("REFUND", names::RECEIVE_PENDING) => refund::handle_receive_pending_refund(ctx, entity_id(topic, envelope)?).await?.into(),
            ("REFUND", names::CLOSE) => refund::close_refund(ctx, payload(topic, envelope)?).await?.into(),
            ("REFUND", names::CANCEL) => refund::cancel_refund(ctx, payload(topic, envelope)?).await?.into(),
            ("REFUND", names::CANCEL_PENDING) => refund::handle_cancel_pending_refund(ctx, entity_id(topic, envelope)?).await?.into(),
            ("REFUND", names::REVERTED) => refund::handle_revert_refund(ctx, entity_id(topic, envelope)?).await?.into(),

            // fraud detections
            ("FRAUD_DETECTION", names::REGISTER) => fraud_detection::register_fraud_detection(ctx, payload(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::REGISTER_PENDING) => fraud_detection::handle_register_pending_fraud_detection(ctx, entity_id(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::CANCEL_REGISTERED) => fraud_detection::cancel_registered_fraud_detection(ctx, entity_id(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::CANCEL_REGISTERED_PENDING) => fraud_detection::handle_cancel_registered_pending_fraud_detection(ctx, entity_id(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::RECEIVE) => fraud_detection::receive_fraud_detection(ctx, payload(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::RECEIVED_PENDING) => fraud_detection::handle_received_pending_fraud_detection(ctx, entity_id(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::CANCEL_RECEIVED) => fraud_detection::cancel_received_fraud_detection(ctx, payload(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::CANCEL_RECEIVED_PENDING) => fraud_detection::handle_cancel_received_pending_fraud_detection(ctx, entity_id(topic, envelope)?).await?.into(),
            ("FRAUD_DETECTION", names::REVERTED) => fraud_detection::handle_revert_fraud_detection(ctx, entity_id(topic, envelope)?).await?.into(),

            // notifications
            ("SMS", names::CREATE) => sms::create_sms(ctx, payload(topic, envelope)?).await?.into(),
            ("SMS", event) if event.starts_with("SEND.") => {
                let provider = &event["SEND.".len()..];
                if !ctx.gateways.sms.contains_key(provider) {
                    warn!(topic, provider, "message for unknown sms provider");
                }
                sms::handle_send_sms(ctx, entity_id(topic, envelope)?, provider).await?.into()
            }
            ("EMAIL", names::CREATE) => email::create_email(ctx, payload(topic, envelope)?).await?.into(),
            ("EMAIL", names::PENDING) => email::handle_pending_email(ctx, entity_id(topic, envelope)?).await?.into(),

            _ => return Ok(None),
        };
        Ok(Some(routed))
    }
}

/// Every topic the dispatcher consumes, for bus subscriptions.
pub fn subscribed_topics(sms_providers: &[String]) -> Vec<String> {
    let transfer = [
        names::PENDING,
        names::COMPLETE,
        names::REVERTED,
        names::CHARGEBACK,
        names::DEAD_LETTER,
    ];
    let mut topics: Vec<String> = Vec::new();
    for domain in [Domain::Payment, Domain::Devolution, Domain::RefundDevolution, Domain::WarningDevolution] {
        topics.extend(transfer.iter().map(|event| domain.topic(event)));
    }
    let others: &[(Domain, &[&str])] = &[
        (Domain::Payment, &[names::CREATE, names::CANCEL]),
        (Domain::Devolution, &[names::CREATE]),
        (Domain::RefundDevolution, &[names::CONFIRMED, names::FAILED]),
        (Domain::Deposit, &[names::RECEIVE, names::NEW, names::FAILED]),
        (
            Domain::WarningDeposit,
            &[names::CREATED, names::APPROVE, names::REJECT, names::APPROVED, names::REJECTED],
        ),
        (Domain::DevolutionReceived, &[names::RECEIVE, names::READY, names::FAILED]),
        (
            Domain::Infraction,
            &[
                names::CREATE,
                names::OPEN,
                names::OPEN_PENDING,
                names::RECEIVE,
                names::RECEIVE_PENDING,
                names::CLOSE,
                names::CLOSE_PENDING,
                names::CLOSE_NOTIFICATION,
                names::CANCEL,
                names::CANCEL_PENDING,
                names::REVERTED,
            ],
        ),
        (
            Domain::Refund,
            &[
                names::RECEIVE,
                names::RECEIVE_PENDING,
                names::CLOSE,
                names::CANCEL,
                names::CANCEL_PENDING,
                names::REVERTED,
            ],
        ),
        (
            Domain::FraudDetection,
            &[
                names::REGISTER,
                names::REGISTER_PENDING,
                names::CANCEL_REGISTERED,
                names::CANCEL_REGISTERED_PENDING,
                names::RECEIVE,
                names::RECEIVED_PENDING,
                names::CANCEL_RECEIVED,
                names::CANCEL_RECEIVED_PENDING,
                names::REVERTED,
            ],
        ),
        (Domain::Sms, &[names::CREATE]),
        (Domain::Email, &[names::CREATE, names::PENDING]),
    ];
    for (domain, events) in others {
        topics.extend(events.iter().map(|event| domain.topic(event)));
    }
    topics.extend(sms_providers.iter().map(|provider| crate::events::sms_provider_topic(provider)));
    topics
}
