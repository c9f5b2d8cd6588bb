//! Outbound collaborators. Every call returns `GatewayError` on failure; the
//! saga layer decides whether that becomes a revert, a retry or nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    FraudType, OperationRef, PersonType, PixAccount, PixInfractionAnalysisResult,
    PixInfractionType, PixRefundRejectionReason, TransactionRef, WarningReason,
};
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferKind {
    Payment,
    Devolution,
}

/// Transfer submitted to the payment scheme. `id` doubles as the idempotency
/// key on the provider side, so resending the same order is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOrder {
    pub id: Uuid,
    pub kind: TransferKind,
    pub amount: i64,
    pub description: Option<String>,
    pub beneficiary: Option<PixAccount>,
    pub original_end_to_end_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub external_id: String,
    pub end_to_end_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Processing,
    #[serde(rename_all = "camelCase")]
    Completed { end_to_end_id: Option<String> },
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfractionRequest {
    pub id: Uuid,
    pub infraction_type: PixInfractionType,
    pub end_to_end_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudDetectionRequest {
    pub id: Uuid,
    pub person_type: PersonType,
    pub document: String,
    pub fraud_type: FraudType,
    pub key: Option<String>,
}

#[async_trait]
pub trait PixPaymentGateway: Send + Sync {
    async fn send_transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, GatewayError>;

    async fn get_transfer(&self, external_id: &str) -> Result<TransferStatus, GatewayError>;

    /// Returns the scheme identifier of the new infraction.
    async fn create_infraction(&self, request: &InfractionRequest) -> Result<String, GatewayError>;

    async fn close_infraction(
        &self,
        infraction_psp_id: &str,
        result: PixInfractionAnalysisResult,
        details: Option<&str>,
    ) -> Result<(), GatewayError>;

    async fn cancel_infraction(&self, infraction_psp_id: &str) -> Result<(), GatewayError>;

    async fn close_refund(
        &self,
        refund_psp_id: &str,
        devolution_end_to_end_id: Option<&str>,
    ) -> Result<(), GatewayError>;

    async fn cancel_refund(
        &self,
        refund_psp_id: &str,
        reason: PixRefundRejectionReason,
        details: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Returns the scheme identifier of the fraud marking.
    async fn create_fraud_detection(
        &self,
        request: &FraudDetectionRequest,
    ) -> Result<String, GatewayError>;

    async fn cancel_fraud_detection(&self, external_id: &str) -> Result<(), GatewayError>;
}

/// Ledger entry request. `id` is chosen by the caller so creation is
/// idempotent on the ledger side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub id: Uuid,
    pub tag: String,
    pub owner_id: Uuid,
    pub value: i64,
    pub description: String,
}

#[async_trait]
pub trait OperationService: Send + Sync {
    async fn create_operation(&self, request: &OperationRequest) -> Result<OperationRef, GatewayError>;

    async fn accept_operation(&self, operation_id: Uuid) -> Result<(), GatewayError>;

    async fn revert_operation(&self, operation_id: Uuid) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    Infraction,
    Refund,
    FraudDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub kind: IssueKind,
    pub entity_id: Uuid,
    pub transaction: Option<TransactionRef>,
    pub summary: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueUpdate {
    pub status: String,
    pub comment: Option<String>,
}

#[async_trait]
pub trait IssueTrackerGateway: Send + Sync {
    /// Returns the tracker's issue id.
    async fn create_issue(&self, request: &IssueRequest) -> Result<String, GatewayError>;

    async fn update_issue(&self, issue_id: &str, update: &IssueUpdate) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningTransactionRequest {
    pub warning_deposit_id: Uuid,
    pub deposit_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reasons: Vec<WarningReason>,
}

#[async_trait]
pub trait ComplianceGateway: Send + Sync {
    /// Opens a compliance analysis and returns its transaction id.
    async fn create_warning_transaction(
        &self,
        request: &WarningTransactionRequest,
    ) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait UserService: Send + Sync {
    /// Declared monthly income in cents, if the user declared one.
    async fn get_monthly_income(&self, user_id: Uuid) -> Result<Option<i64>, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessage {
    pub id: Uuid,
    pub phone_number: String,
    pub body: String,
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub id: Uuid,
    pub to: String,
    pub from: String,
    pub title: String,
    pub body: String,
    pub html: bool,
}

#[async_trait]
pub trait SmtpGateway: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), GatewayError>;
}
