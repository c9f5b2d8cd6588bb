//! HTTP bindings of the gateway ports on top of [`HttpGatewayClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::http_gateway::HttpGatewayClient;
use crate::domain::{OperationRef, PixInfractionAnalysisResult, PixRefundRejectionReason};
use crate::error::GatewayError;
use crate::ports::{
    ComplianceGateway, EmailMessage, FraudDetectionRequest, InfractionRequest, IssueRequest,
    IssueTrackerGateway, IssueUpdate, OperationRequest, OperationService, PixPaymentGateway,
    SmsGateway, SmsMessage, SmtpGateway, TransferOrder, TransferReceipt, TransferStatus,
    UserService, WarningTransactionRequest,
};

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseInfractionBody<'a> {
    analysis_result: PixInfractionAnalysisResult,
    analysis_details: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseRefundBody<'a> {
    devolution_end_to_end_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelRefundBody<'a> {
    rejection_reason: PixRefundRejectionReason,
    analysis_details: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeResponse {
    monthly_income: Option<i64>,
}

/// Pix provider (PSP) API.
#[derive(Clone)]
pub struct HttpPixGateway {
    client: HttpGatewayClient,
}

impl HttpPixGateway {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PixPaymentGateway for HttpPixGateway {
    async fn send_transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, GatewayError> {
        self.client.post_json("/transfers", order).await
    }

    async fn get_transfer(&self, external_id: &str) -> Result<TransferStatus, GatewayError> {
        self.client.get_json(&format!("/transfers/{external_id}")).await
    }

    async fn create_infraction(&self, request: &InfractionRequest) -> Result<String, GatewayError> {
        let created: CreatedResource = self.client.post_json("/infractions", request).await?;
        Ok(created.id)
    }

    async fn close_infraction(
        &self,
        infraction_psp_id: &str,
        result: PixInfractionAnalysisResult,
        details: Option<&str>,
    ) -> Result<(), GatewayError> {
        let body = CloseInfractionBody {
            analysis_result: result,
            analysis_details: details,
        };
        self.client
            .post(&format!("/infractions/{infraction_psp_id}/close"), &body)
            .await
    }

    async fn cancel_infraction(&self, infraction_psp_id: &str) -> Result<(), GatewayError> {
        self.client
            .post(&format!("/infractions/{infraction_psp_id}/cancel"), &serde_json::json!({}))
            .await
    }

    async fn close_refund(
        &self,
        refund_psp_id: &str,
        devolution_end_to_end_id: Option<&str>,
    ) -> Result<(), GatewayError> {
        let body = CloseRefundBody {
            devolution_end_to_end_id,
        };
        self.client
            .post(&format!("/refunds/{refund_psp_id}/close"), &body)
            .await
    }

    async fn cancel_refund(
        &self,
        refund_psp_id: &str,
        reason: PixRefundRejectionReason,
        details: Option<&str>,
    ) -> Result<(), GatewayError> {
        let body = CancelRefundBody {
            rejection_reason: reason,
            analysis_details: details,
        };
        self.client
            .post(&format!("/refunds/{refund_psp_id}/cancel"), &body)
            .await
    }

    async fn create_fraud_detection(
        &self,
        request: &FraudDetectionRequest,
    ) -> Result<String, GatewayError> {
        let created: CreatedResource = self.client.post_json("/fraud-detections", request).await?;
        Ok(created.id)
    }

    async fn cancel_fraud_detection(&self, external_id: &str) -> Result<(), GatewayError> {
        self.client
            .post(&format!("/fraud-detections/{external_id}/cancel"), &serde_json::json!({}))
            .await
    }
}

/// Ledger API.
#[derive(Clone)]
pub struct HttpOperationService {
    client: HttpGatewayClient,
}

impl HttpOperationService {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperationService for HttpOperationService {
    async fn create_operation(&self, request: &OperationRequest) -> Result<OperationRef, GatewayError> {
        self.client.post_json("/operations", request).await
    }

    async fn accept_operation(&self, operation_id: Uuid) -> Result<(), GatewayError> {
        self.client
            .post(&format!("/operations/{operation_id}/accept"), &serde_json::json!({}))
            .await
    }

    async fn revert_operation(&self, operation_id: Uuid) -> Result<(), GatewayError> {
        self.client
            .post(&format!("/operations/{operation_id}/revert"), &serde_json::json!({}))
            .await
    }
}

#[derive(Clone)]
pub struct HttpIssueTracker {
    client: HttpGatewayClient,
}

impl HttpIssueTracker {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IssueTrackerGateway for HttpIssueTracker {
    async fn create_issue(&self, request: &IssueRequest) -> Result<String, GatewayError> {
        let created: CreatedResource = self.client.post_json("/issues", request).await?;
        Ok(created.id)
    }

    async fn update_issue(&self, issue_id: &str, update: &IssueUpdate) -> Result<(), GatewayError> {
        self.client
            .post(&format!("/issues/{issue_id}/transitions"), update)
            .await
    }
}

#[derive(Clone)]
pub struct HttpComplianceGateway {
    client: HttpGatewayClient,
}

impl HttpComplianceGateway {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComplianceGateway for HttpComplianceGateway {
    async fn create_warning_transaction(
        &self,
        request: &WarningTransactionRequest,
    ) -> Result<String, GatewayError> {
        let created: CreatedResource = self
            .client
            .post_json("/warning-transactions", request)
            .await?;
        Ok(created.id)
    }
}

#[derive(Clone)]
pub struct HttpUserService {
    client: HttpGatewayClient,
}

impl HttpUserService {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserService for HttpUserService {
    async fn get_monthly_income(&self, user_id: Uuid) -> Result<Option<i64>, GatewayError> {
        let income: Option<IncomeResponse> = self
            .client
            .get_optional(&format!("/users/{user_id}/income"))
            .await?;
        Ok(income.and_then(|income| income.monthly_income))
    }
}

/// One SMS carrier. Each provider gets its own client, and so its own breaker.
#[derive(Clone)]
pub struct HttpSmsGateway {
    client: HttpGatewayClient,
}

impl HttpSmsGateway {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), GatewayError> {
        self.client.post("/messages", message).await
    }
}

#[derive(Clone)]
pub struct HttpSmtpGateway {
    client: HttpGatewayClient,
}

impl HttpSmtpGateway {
    pub fn new(client: HttpGatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SmtpGateway for HttpSmtpGateway {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), GatewayError> {
        self.client.post("/emails", message).await
    }
}
