//! Reconciliation jobs: find entities stuck in a non-terminal state and drive
//! them again through the same controllers the bus uses.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use tracing::{error, info};
use uuid::Uuid;

use crate::dispatcher::SagaDispatcher;
use crate::domain::{
    NotificationState, PaymentState, PixDepositState, PixDevolutionReceivedState,
    PixDevolutionState, PixFraudDetectionState, PixInfractionState, PixRefundDevolutionState,
    PixRefundState, SagaEntity, WarningPixDepositState, WarningPixDevolutionState,
};
use crate::error::SagaError;
use crate::events::OutboundEvent;
use crate::notify::{email, sms};
use crate::ports::{EntityRepository, ThresholdComparison};
use crate::saga::deposit::WarningDepositRef;
use crate::saga::{
    deposit, devolution, devolution_received, fraud_detection, infraction, payment, refund,
    warning_deposit, warning_devolution, SagaContext, SagaResult, Transition,
};
use crate::services::scheduler::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ReconciliationJob {
    SyncScheduledPayments,
    SyncPendingPayments,
    SyncWaitingPayments,
    SyncPendingDevolutions,
    SyncWaitingDevolutions,
    SyncPendingRefundDevolutions,
    SyncWaitingRefundDevolutions,
    SyncPendingWarningDevolutions,
    SyncWaitingWarningDevolutions,
    SyncNewDeposits,
    SyncWaitingDeposits,
    SyncCreatedWarningDeposits,
    SyncReadyDevolutionsReceived,
    SyncPendingInfractions,
    SyncPendingRefunds,
    SyncPendingFraudDetections,
    SyncNotifications,
}

impl ReconciliationJob {
    pub const ALL: &'static [ReconciliationJob] = &[
        ReconciliationJob::SyncScheduledPayments,
        ReconciliationJob::SyncPendingPayments,
        ReconciliationJob::SyncWaitingPayments,
        ReconciliationJob::SyncPendingDevolutions,
        ReconciliationJob::SyncWaitingDevolutions,
        ReconciliationJob::SyncPendingRefundDevolutions,
        ReconciliationJob::SyncWaitingRefundDevolutions,
        ReconciliationJob::SyncPendingWarningDevolutions,
        ReconciliationJob::SyncWaitingWarningDevolutions,
        ReconciliationJob::SyncNewDeposits,
        ReconciliationJob::SyncWaitingDeposits,
        ReconciliationJob::SyncCreatedWarningDeposits,
        ReconciliationJob::SyncReadyDevolutionsReceived,
        ReconciliationJob::SyncPendingInfractions,
        ReconciliationJob::SyncPendingRefunds,
        ReconciliationJob::SyncPendingFraudDetections,
        ReconciliationJob::SyncNotifications,
    ];

    /// Kebab-case name, used as lock name and CLI value.
    pub fn name(&self) -> String {
        self.to_possible_value()
            .map(|value| value.get_name().to_string())
            .unwrap_or_else(|| format!("{:?}", self))
    }
}

/// Age after which a non-terminal entity counts as stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationSettings {
    pub pending_threshold: Duration,
    pub waiting_threshold: Duration,
    pub notification_threshold: Duration,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            pending_threshold: Duration::minutes(2),
            waiting_threshold: Duration::minutes(10),
            notification_threshold: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub visited: usize,
    pub applied: usize,
    pub emitted: usize,
    pub failed: usize,
    pub ignored: usize,
    pub errors: usize,
    pub events: Vec<OutboundEvent>,
}

impl ReconciliationReport {
    pub fn record<E>(&mut self, id: Uuid, result: SagaResult<E>) {
        self.visited += 1;
        match result {
            Ok(transition) => {
                match &transition {
                    Transition::Applied { .. } => self.applied += 1,
                    Transition::Emitted { .. } => self.emitted += 1,
                    Transition::Failed { .. } => self.failed += 1,
                    Transition::Ignored { .. } => self.ignored += 1,
                }
                self.events.extend(transition.into_events());
            }
            Err(e) => {
                self.errors += 1;
                error!(entity_id = %id, error = %e, "reconciliation step failed");
            }
        }
    }

    async fn drive<E, F, Fut>(&mut self, ids: Vec<Uuid>, controller: F)
    where
        F: Fn(Uuid) -> Fut,
        Fut: Future<Output = SagaResult<E>>,
    {
        for id in ids {
            let result = controller(id).await;
            self.record(id, result);
        }
    }
}

async fn stale<E: SagaEntity>(
    repository: &dyn EntityRepository<E>,
    state: E::State,
    before: DateTime<Utc>,
) -> Result<Vec<Uuid>, SagaError> {
    Ok(repository
        .get_all_by_state_and_threshold_date(state, before, ThresholdComparison::BeforeThan)
        .await?
        .iter()
        .map(|entity| entity.id())
        .collect())
}

pub struct Reconciler {
    ctx: SagaContext,
    settings: ReconciliationSettings,
}

impl Reconciler {
    pub fn new(ctx: SagaContext, settings: ReconciliationSettings) -> Self {
        Self { ctx, settings }
    }

    pub async fn run(&self, job: ReconciliationJob, now: DateTime<Utc>) -> Result<ReconciliationReport, SagaError> {
        let ctx = &self.ctx;
        let repos = &ctx.repositories;
        let pending = now - self.settings.pending_threshold;
        let waiting = now - self.settings.waiting_threshold;
        let notifications = now - self.settings.notification_threshold;
        let mut report = ReconciliationReport::default();

        match job {
            ReconciliationJob::SyncScheduledPayments => {
                let ids = repos
                    .payments
                    .get_all_by_state(PaymentState::Scheduled)
                    .await?
                    .into_iter()
                    .filter(|payment| payment.is_due(now))
                    .map(|payment| payment.id)
                    .collect();
                report
                    .drive(ids, |id| payment::handle_scheduled_payment(ctx, id, now))
                    .await;
            }
            ReconciliationJob::SyncPendingPayments => {
                let ids = stale(repos.payments.as_ref(), PaymentState::Pending, pending).await?;
                report.drive(ids, |id| payment::handle_pending_payment(ctx, id)).await;
            }
            ReconciliationJob::SyncWaitingPayments => {
                let ids = stale(repos.payments.as_ref(), PaymentState::Waiting, waiting).await?;
                report.drive(ids, |id| payment::sync_waiting_payment(ctx, id)).await;
            }
            ReconciliationJob::SyncPendingDevolutions => {
                let ids = stale(repos.devolutions.as_ref(), PixDevolutionState::Pending, pending).await?;
                report.drive(ids, |id| devolution::handle_pending_devolution(ctx, id)).await;
            }
            ReconciliationJob::SyncWaitingDevolutions => {
                let ids = stale(repos.devolutions.as_ref(), PixDevolutionState::Waiting, waiting).await?;
                report.drive(ids, |id| devolution::sync_waiting_devolution(ctx, id)).await;
            }
            ReconciliationJob::SyncPendingRefundDevolutions => {
                let ids = stale(
                    repos.refund_devolutions.as_ref(),
                    PixRefundDevolutionState::Pending,
                    pending,
                )
                .await?;
                report.drive(ids, |id| refund::handle_pending_refund_devolution(ctx, id)).await;
            }
            ReconciliationJob::SyncWaitingRefundDevolutions => {
                let ids = stale(
                    repos.refund_devolutions.as_ref(),
                    PixRefundDevolutionState::Waiting,
                    waiting,
                )
                .await?;
                report.drive(ids, |id| refund::sync_waiting_refund_devolution(ctx, id)).await;
            }
            ReconciliationJob::SyncPendingWarningDevolutions => {
                let ids = stale(
                    repos.warning_devolutions.as_ref(),
                    WarningPixDevolutionState::Pending,
                    pending,
                )
                .await?;
                report
                    .drive(ids, |id| warning_devolution::handle_pending_warning_devolution(ctx, id))
                    .await;
            }
            ReconciliationJob::SyncWaitingWarningDevolutions => {
                let ids = stale(
                    repos.warning_devolutions.as_ref(),
                    WarningPixDevolutionState::Waiting,
                    waiting,
                )
                .await?;
                report
                    .drive(ids, |id| warning_devolution::sync_waiting_warning_devolution(ctx, id))
                    .await;
            }
            ReconciliationJob::SyncNewDeposits => {
                let ids = stale(repos.deposits.as_ref(), PixDepositState::New, pending).await?;
                report.drive(ids, |id| deposit::handle_new_deposit(ctx, id)).await;
            }
            ReconciliationJob::SyncWaitingDeposits => {
                let ids = stale(repos.deposits.as_ref(), PixDepositState::Waiting, waiting).await?;
                for deposit_id in ids {
                    let Some(warning) = repos
                        .warning_deposits
                        .find_one_by_field(&["depositId"], &deposit_id.to_string())
                        .await?
                    else {
                        continue;
                    };
                    match warning.state {
                        WarningPixDepositState::Approved => report.record(
                            deposit_id,
                            deposit::handle_approved_warning_deposit(ctx, deposit_id).await,
                        ),
                        WarningPixDepositState::Rejected => {
                            let reference = WarningDepositRef {
                                id: warning.id,
                                deposit_id,
                            };
                            report.record(
                                deposit_id,
                                deposit::handle_rejected_warning_deposit(ctx, reference).await,
                            )
                        }
                        WarningPixDepositState::Created | WarningPixDepositState::Checked => {}
                    }
                }
            }
            ReconciliationJob::SyncCreatedWarningDeposits => {
                let ids = stale(
                    repos.warning_deposits.as_ref(),
                    WarningPixDepositState::Created,
                    pending,
                )
                .await?;
                report
                    .drive(ids, |id| warning_deposit::handle_created_warning_deposit(ctx, id))
                    .await;
            }
            ReconciliationJob::SyncReadyDevolutionsReceived => {
                let ids = stale(
                    repos.devolutions_received.as_ref(),
                    PixDevolutionReceivedState::Ready,
                    pending,
                )
                .await?;
                report
                    .drive(ids, |id| devolution_received::handle_ready_devolution_received(ctx, id))
                    .await;
            }
            ReconciliationJob::SyncPendingInfractions => {
                let repository = repos.infractions.as_ref();
                let ids = stale(repository, PixInfractionState::OpenPending, pending).await?;
                report.drive(ids, |id| infraction::handle_open_pending_infraction(ctx, id)).await;
                let ids = stale(repository, PixInfractionState::ReceivePending, pending).await?;
                report.drive(ids, |id| infraction::handle_receive_pending_infraction(ctx, id)).await;
                let ids = stale(repository, PixInfractionState::ClosePending, pending).await?;
                report.drive(ids, |id| infraction::handle_close_pending_infraction(ctx, id)).await;
                let ids = stale(repository, PixInfractionState::CancelPending, pending).await?;
                report.drive(ids, |id| infraction::handle_cancel_pending_infraction(ctx, id)).await;
            }
            ReconciliationJob::SyncPendingRefunds => {
                let repository = repos.refunds.as_ref();
                let ids = stale(repository, PixRefundState::ReceivePending, pending).await?;
                report.drive(ids, |id| refund::handle_receive_pending_refund(ctx, id)).await;
                let ids = stale(repository, PixRefundState::CancelPending, pending).await?;
                report.drive(ids, |id| refund::handle_cancel_pending_refund(ctx, id)).await;

                let closing = repository
                    .get_all_by_state_and_threshold_date(
                        PixRefundState::ClosePending,
                        pending,
                        ThresholdComparison::BeforeThan,
                    )
                    .await?;
                for pix_refund in closing {
                    let Some(devolution_id) = pix_refund.refund_devolution_id else {
                        continue;
                    };
                    let Some(devolution) = repos.refund_devolutions.get_by_id(devolution_id).await? else {
                        continue;
                    };
                    match devolution.state {
                        PixRefundDevolutionState::Confirmed => report.record(
                            pix_refund.id,
                            refund::handle_refund_devolution_confirmed(ctx, pix_refund.id).await,
                        ),
                        PixRefundDevolutionState::Failed | PixRefundDevolutionState::DeadLetter => report.record(
                            pix_refund.id,
                            refund::handle_refund_devolution_failed(ctx, pix_refund.id).await,
                        ),
                        PixRefundDevolutionState::Pending | PixRefundDevolutionState::Waiting => {}
                    }
                }
            }
            ReconciliationJob::SyncPendingFraudDetections => {
                let repository = repos.fraud_detections.as_ref();
                let ids = stale(repository, PixFraudDetectionState::RegisterPending, pending).await?;
                report
                    .drive(ids, |id| fraud_detection::handle_register_pending_fraud_detection(ctx, id))
                    .await;
                let ids = stale(repository, PixFraudDetectionState::CancelRegisteredPending, pending).await?;
                report
                    .drive(ids, |id| {
                        fraud_detection::handle_cancel_registered_pending_fraud_detection(ctx, id)
                    })
                    .await;
                let ids = stale(repository, PixFraudDetectionState::ReceivedPending, pending).await?;
                report
                    .drive(ids, |id| fraud_detection::handle_received_pending_fraud_detection(ctx, id))
                    .await;
                let ids = stale(repository, PixFraudDetectionState::CancelReceivedPending, pending).await?;
                report
                    .drive(ids, |id| {
                        fraud_detection::handle_cancel_received_pending_fraud_detection(ctx, id)
                    })
                    .await;
            }
            ReconciliationJob::SyncNotifications => {
                let ids = stale(repos.sms.as_ref(), NotificationState::Pending, notifications).await?;
                report.drive(ids, |id| sms::resend_pending_sms(ctx, id)).await;
                let ids = stale(repos.sms.as_ref(), NotificationState::Processing, notifications).await?;
                report.drive(ids, |id| sms::requeue_stuck_sms(ctx, id)).await;
                let ids = stale(repos.emails.as_ref(), NotificationState::Pending, notifications).await?;
                report.drive(ids, |id| email::handle_pending_email(ctx, id)).await;
                let ids = stale(repos.emails.as_ref(), NotificationState::Processing, notifications).await?;
                report.drive(ids, |id| email::requeue_stuck_email(ctx, id)).await;
            }
        }

        info!(
            job = %job.name(),
            visited = report.visited,
            applied = report.applied,
            failed = report.failed,
            errors = report.errors,
            "reconciliation finished"
        );
        Ok(report)
    }
}

/// Adapts a reconciliation job to the scheduler: runs it and publishes what
/// the controllers produced.
pub struct ReconciliationTask {
    job: ReconciliationJob,
    name: String,
    dispatcher: Arc<SagaDispatcher>,
}

impl ReconciliationTask {
    pub fn new(job: ReconciliationJob, dispatcher: Arc<SagaDispatcher>) -> Self {
        Self {
            job,
            name: job.name(),
            dispatcher,
        }
    }
}

#[async_trait]
impl Job for ReconciliationTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<usize> {
        let report = self.dispatcher.reconcile(self.job, Utc::now()).await?;
        Ok(report.visited)
    }
}
