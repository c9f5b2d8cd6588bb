use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{
    Email, Payment, PixDeposit, PixDevolution, PixDevolutionReceived, PixFraudDetection,
    PixInfraction, PixInfractionRefundOperation, PixRefund, PixRefundDevolution, Sms,
    WarningPixDeposit, WarningPixDevolution,
};
use crate::notify::SmsRouting;
use crate::ports::{
    CacheStore, ComplianceGateway, EntityRepository, IssueTrackerGateway, OperationService,
    PixPaymentGateway, SmsGateway, SmtpGateway, Translator, UserService,
};
use crate::screening::ScreeningSettings;

#[derive(Clone)]
pub struct Repositories {
    pub payments: Arc<dyn EntityRepository<Payment>>,
    pub deposits: Arc<dyn EntityRepository<PixDeposit>>,
    pub devolutions: Arc<dyn EntityRepository<PixDevolution>>,
    pub devolutions_received: Arc<dyn EntityRepository<PixDevolutionReceived>>,
    pub refund_devolutions: Arc<dyn EntityRepository<PixRefundDevolution>>,
    pub warning_devolutions: Arc<dyn EntityRepository<WarningPixDevolution>>,
    pub warning_deposits: Arc<dyn EntityRepository<WarningPixDeposit>>,
    pub infractions: Arc<dyn EntityRepository<PixInfraction>>,
    pub refunds: Arc<dyn EntityRepository<PixRefund>>,
    pub refund_operations: Arc<dyn EntityRepository<PixInfractionRefundOperation>>,
    pub fraud_detections: Arc<dyn EntityRepository<PixFraudDetection>>,
    pub sms: Arc<dyn EntityRepository<Sms>>,
    pub emails: Arc<dyn EntityRepository<Email>>,
}

/// SMS carriers keyed by upper-case provider name.
pub type SmsProviders = HashMap<String, Arc<dyn SmsGateway>>;

#[derive(Clone)]
pub struct Gateways {
    pub pix: Arc<dyn PixPaymentGateway>,
    pub operations: Arc<dyn OperationService>,
    pub issues: Arc<dyn IssueTrackerGateway>,
    pub compliance: Arc<dyn ComplianceGateway>,
    pub users: Arc<dyn UserService>,
    pub sms: SmsProviders,
    pub smtp: Arc<dyn SmtpGateway>,
}

/// Ledger tags for the operations each saga creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTags {
    pub payment: String,
    pub deposit: String,
    pub devolution: String,
    pub devolution_received: String,
    pub refund_devolution: String,
    pub warning_devolution: String,
}

#[derive(Debug, Clone)]
pub struct SagaSettings {
    pub pix_ispb: String,
    pub refund_devolution_interval_days: i64,
    pub email_max_attempts: u32,
    pub operation_tags: OperationTags,
    pub screening: ScreeningSettings,
    pub sms: SmsRouting,
}

/// Collaborators handed to every controller. Cheap to clone; the dispatcher
/// clones one per message.
#[derive(Clone)]
pub struct SagaContext {
    pub repositories: Repositories,
    pub gateways: Gateways,
    pub cache: Arc<dyn CacheStore>,
    pub translator: Arc<dyn Translator>,
    pub settings: Arc<SagaSettings>,
}
