#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use pix_saga_core::adapters::{in_memory_repositories, CatalogTranslator, InMemoryCache};
use pix_saga_core::domain::{OperationRef, PixAccount, PixInfractionAnalysisResult, PixRefundRejectionReason};
use pix_saga_core::error::GatewayError;
use pix_saga_core::notify::SmsRouting;
use pix_saga_core::ports::{
    ComplianceGateway, EmailMessage, FraudDetectionRequest, InfractionRequest, IssueRequest,
    IssueTrackerGateway, IssueUpdate, OperationRequest, OperationService, PixPaymentGateway,
    SmsGateway, SmsMessage, SmtpGateway, TransferOrder, TransferReceipt, TransferStatus,
    UserService, WarningTransactionRequest,
};
use pix_saga_core::saga::{Gateways, OperationTags, SagaContext, SagaSettings, SmsProviders};
use pix_saga_core::screening::ScreeningSettings;

/// Records calls per operation and fails the ones told to.
#[derive(Default)]
pub struct Script {
    failures: Mutex<HashMap<&'static str, GatewayError>>,
    calls: Mutex<Vec<&'static str>>,
}

impl Script {
    pub fn fail(&self, operation: &'static str, error: GatewayError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    pub fn heal(&self, operation: &'static str) {
        self.failures.lock().unwrap().remove(operation);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| **call == operation).count()
    }

    fn record(&self, operation: &'static str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(operation);
        match self.failures.lock().unwrap().get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

pub fn unavailable() -> GatewayError {
    GatewayError::Unavailable("connection refused".to_string())
}

pub fn rejected(code: &str) -> GatewayError {
    GatewayError::Rejected {
        code: code.to_string(),
        message: format!("rejected with {code}"),
    }
}

#[derive(Default)]
pub struct FakePix {
    pub script: Script,
    pub transfer_status: Mutex<Option<TransferStatus>>,
    pub sent: Mutex<Vec<TransferOrder>>,
}

#[async_trait]
impl PixPaymentGateway for FakePix {
    async fn send_transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, GatewayError> {
        self.script.record("send_transfer")?;
        self.sent.lock().unwrap().push(order.clone());
        Ok(TransferReceipt {
            external_id: format!("ext-{}", order.id),
            end_to_end_id: Some(format!("E{}", order.id.simple())),
        })
    }

    async fn get_transfer(&self, _external_id: &str) -> Result<TransferStatus, GatewayError> {
        self.script.record("get_transfer")?;
        Ok(self
            .transfer_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(TransferStatus::Processing))
    }

    async fn create_infraction(&self, request: &InfractionRequest) -> Result<String, GatewayError> {
        self.script.record("create_infraction")?;
        Ok(format!("psp-infraction-{}", request.id.simple()))
    }

    async fn close_infraction(
        &self,
        _infraction_psp_id: &str,
        _result: PixInfractionAnalysisResult,
        _details: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.script.record("close_infraction")
    }

    async fn cancel_infraction(&self, _infraction_psp_id: &str) -> Result<(), GatewayError> {
        self.script.record("cancel_infraction")
    }

    async fn close_refund(
        &self,
        _refund_psp_id: &str,
        _devolution_end_to_end_id: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.script.record("close_refund")
    }

    async fn cancel_refund(
        &self,
        _refund_psp_id: &str,
        _reason: PixRefundRejectionReason,
        _details: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.script.record("cancel_refund")
    }

    async fn create_fraud_detection(
        &self,
        request: &FraudDetectionRequest,
    ) -> Result<String, GatewayError> {
        self.script.record("create_fraud_detection")?;
        Ok(format!("psp-fraud-{}", request.id.simple()))
    }

    async fn cancel_fraud_detection(&self, _external_id: &str) -> Result<(), GatewayError> {
        self.script.record("cancel_fraud_detection")
    }
}

#[derive(Default)]
pub struct FakeLedger {
    pub script: Script,
}

#[async_trait]
impl OperationService for FakeLedger {
    async fn create_operation(&self, request: &OperationRequest) -> Result<OperationRef, GatewayError> {
        self.script.record("create_operation")?;
        Ok(OperationRef {
            id: request.id,
            value: request.value,
        })
    }

    async fn accept_operation(&self, _operation_id: Uuid) -> Result<(), GatewayError> {
        self.script.record("accept_operation")
    }

    async fn revert_operation(&self, _operation_id: Uuid) -> Result<(), GatewayError> {
        self.script.record("revert_operation")
    }
}

#[derive(Default)]
pub struct FakeIssues {
    pub script: Script,
}

#[async_trait]
impl IssueTrackerGateway for FakeIssues {
    async fn create_issue(&self, request: &IssueRequest) -> Result<String, GatewayError> {
        self.script.record("create_issue")?;
        Ok(format!("ISSUE-{}", request.entity_id.simple()))
    }

    async fn update_issue(&self, _issue_id: &str, _update: &IssueUpdate) -> Result<(), GatewayError> {
        self.script.record("update_issue")
    }
}

#[derive(Default)]
pub struct FakeCompliance {
    pub script: Script,
}

#[async_trait]
impl ComplianceGateway for FakeCompliance {
    async fn create_warning_transaction(
        &self,
        request: &WarningTransactionRequest,
    ) -> Result<String, GatewayError> {
        self.script.record("create_warning_transaction")?;
        Ok(format!("warning-{}", request.warning_deposit_id.simple()))
    }
}

#[derive(Default)]
pub struct FakeUsers {
    pub monthly_income: Mutex<Option<i64>>,
}

#[async_trait]
impl UserService for FakeUsers {
    async fn get_monthly_income(&self, _user_id: Uuid) -> Result<Option<i64>, GatewayError> {
        Ok(*self.monthly_income.lock().unwrap())
    }
}

#[derive(Default)]
pub struct FakeSms {
    pub script: Script,
    pub delivered: Mutex<Vec<SmsMessage>>,
}

#[async_trait]
impl SmsGateway for FakeSms {
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), GatewayError> {
        self.script.record("send_sms")?;
        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSmtp {
    pub script: Script,
}

#[async_trait]
impl SmtpGateway for FakeSmtp {
    async fn send_email(&self, _message: &EmailMessage) -> Result<(), GatewayError> {
        self.script.record("send_email")
    }
}

pub const SMS_PROVIDERS: [&str; 3] = ["A", "B", "C"];
pub const INTERNATIONAL_PROVIDER: &str = "INTL";

pub fn settings() -> SagaSettings {
    SagaSettings {
        pix_ispb: "12345678".to_string(),
        refund_devolution_interval_days: 90,
        email_max_attempts: 3,
        operation_tags: OperationTags {
            payment: "PIXSEND".to_string(),
            deposit: "PIXREC".to_string(),
            devolution: "PIXDEVSEND".to_string(),
            devolution_received: "PIXDEVREC".to_string(),
            refund_devolution: "PIXREFUNDDEV".to_string(),
            warning_devolution: "PIXWARNINGDEV".to_string(),
        },
        screening: ScreeningSettings::default(),
        sms: SmsRouting {
            providers: SMS_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            international_provider: INTERNATIONAL_PROVIDER.to_string(),
            rotation_ttl: Duration::from_secs(3600),
        },
    }
}

/// A saga context wired to in-memory storage and scripted gateways.
pub struct Harness {
    pub ctx: SagaContext,
    pub pix: Arc<FakePix>,
    pub ledger: Arc<FakeLedger>,
    pub issues: Arc<FakeIssues>,
    pub compliance: Arc<FakeCompliance>,
    pub users: Arc<FakeUsers>,
    pub sms: HashMap<String, Arc<FakeSms>>,
    pub smtp: Arc<FakeSmtp>,
    pub cache: Arc<InMemoryCache>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut SagaSettings)) -> Self {
        let mut settings = settings();
        configure(&mut settings);

        let pix = Arc::new(FakePix::default());
        let ledger = Arc::new(FakeLedger::default());
        let issues = Arc::new(FakeIssues::default());
        let compliance = Arc::new(FakeCompliance::default());
        let users = Arc::new(FakeUsers::default());
        let smtp = Arc::new(FakeSmtp::default());
        let cache = Arc::new(InMemoryCache::new());

        let sms: HashMap<String, Arc<FakeSms>> = SMS_PROVIDERS
            .iter()
            .chain(std::iter::once(&INTERNATIONAL_PROVIDER))
            .map(|name| (name.to_string(), Arc::new(FakeSms::default())))
            .collect();
        let sms_gateways: SmsProviders = sms
            .iter()
            .map(|(name, fake)| (name.clone(), fake.clone() as Arc<dyn SmsGateway>))
            .collect();

        let ctx = SagaContext {
            repositories: in_memory_repositories(),
            gateways: Gateways {
                pix: pix.clone(),
                operations: ledger.clone(),
                issues: issues.clone(),
                compliance: compliance.clone(),
                users: users.clone(),
                sms: sms_gateways,
                smtp: smtp.clone(),
            },
            cache: cache.clone(),
            translator: Arc::new(CatalogTranslator::empty()),
            settings: Arc::new(settings),
        };

        Self {
            ctx,
            pix,
            ledger,
            issues,
            compliance,
            users,
            sms,
            smtp,
            cache,
        }
    }

    pub fn sms_provider(&self, name: &str) -> &FakeSms {
        &self.sms[name]
    }
}

pub fn account(document: &str, ispb: &str, account_number: &str) -> PixAccount {
    PixAccount {
        name: Some("Maria Silva".to_string()),
        document: document.to_string(),
        ispb: ispb.to_string(),
        branch: Some("0001".to_string()),
        account_number: account_number.to_string(),
    }
}

pub fn topics<E>(transition: &pix_saga_core::saga::Transition<E>) -> Vec<String> {
    transition.events().iter().map(|event| event.topic.clone()).collect()
}
