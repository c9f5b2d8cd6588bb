//! Bus topics and the envelope every message travels in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::SagaEntity;
use crate::error::SagaError;

/// Topic prefix of each saga domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Payment,
    Deposit,
    Devolution,
    DevolutionReceived,
    RefundDevolution,
    WarningDevolution,
    WarningDeposit,
    Infraction,
    Refund,
    FraudDetection,
    Sms,
    Email,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Payment => "PAYMENT",
            Domain::Deposit => "DEPOSIT",
            Domain::Devolution => "DEVOLUTION",
            Domain::DevolutionReceived => "DEVOLUTION_RECEIVED",
            Domain::RefundDevolution => "REFUND_DEVOLUTION",
            Domain::WarningDevolution => "WARNING_DEVOLUTION",
            Domain::WarningDeposit => "WARNING_DEPOSIT",
            Domain::Infraction => "INFRACTION",
            Domain::Refund => "REFUND",
            Domain::FraudDetection => "FRAUD_DETECTION",
            Domain::Sms => "SMS",
            Domain::Email => "EMAIL",
        }
    }

    pub fn topic(&self, event: &str) -> String {
        format!("{}.{}", self.as_str(), event)
    }
}

/// Event names appended to a domain prefix.
pub mod names {
    // commands and scheme notifications
    pub const CREATE: &str = "CREATE";
    pub const RECEIVE: &str = "RECEIVE";
    pub const OPEN: &str = "OPEN";
    pub const CLOSE: &str = "CLOSE";
    pub const CLOSE_NOTIFICATION: &str = "CLOSE_NOTIFICATION";
    pub const CANCEL: &str = "CANCEL";
    pub const COMPLETE: &str = "COMPLETE";
    pub const APPROVE: &str = "APPROVE";
    pub const REJECT: &str = "REJECT";
    pub const REGISTER: &str = "REGISTER";
    pub const CANCEL_REGISTERED: &str = "CANCEL_REGISTERED";
    pub const CANCEL_RECEIVED: &str = "CANCEL_RECEIVED";
    pub const SEND: &str = "SEND";

    // state notifications
    pub const SCHEDULED: &str = "SCHEDULED";
    pub const PENDING: &str = "PENDING";
    pub const WAITING: &str = "WAITING";
    pub const CONFIRMED: &str = "CONFIRMED";
    pub const CANCELED: &str = "CANCELED";
    pub const NEW: &str = "NEW";
    pub const READY: &str = "READY";
    pub const RECEIVED: &str = "RECEIVED";
    pub const BLOCKED: &str = "BLOCKED";
    pub const ERROR: &str = "ERROR";
    pub const CREATED: &str = "CREATED";
    pub const CHECKED: &str = "CHECKED";
    pub const APPROVED: &str = "APPROVED";
    pub const REJECTED: &str = "REJECTED";
    pub const SENT: &str = "SENT";
    pub const NEW_CONFIRMED: &str = "NEW_CONFIRMED";
    pub const OPEN_PENDING: &str = "OPEN_PENDING";
    pub const OPEN_CONFIRMED: &str = "OPEN_CONFIRMED";
    pub const RECEIVE_PENDING: &str = "RECEIVE_PENDING";
    pub const RECEIVE_CONFIRMED: &str = "RECEIVE_CONFIRMED";
    pub const CLOSE_PENDING: &str = "CLOSE_PENDING";
    pub const CLOSE_CONFIRMED: &str = "CLOSE_CONFIRMED";
    pub const CANCEL_PENDING: &str = "CANCEL_PENDING";
    pub const CANCEL_CONFIRMED: &str = "CANCEL_CONFIRMED";
    pub const REGISTER_PENDING: &str = "REGISTER_PENDING";
    pub const REGISTER_CONFIRMED: &str = "REGISTER_CONFIRMED";
    pub const CANCEL_REGISTERED_PENDING: &str = "CANCEL_REGISTERED_PENDING";
    pub const CANCEL_REGISTERED_CONFIRMED: &str = "CANCEL_REGISTERED_CONFIRMED";
    pub const RECEIVED_PENDING: &str = "RECEIVED_PENDING";
    pub const RECEIVED_CONFIRMED: &str = "RECEIVED_CONFIRMED";
    pub const CANCEL_RECEIVED_PENDING: &str = "CANCEL_RECEIVED_PENDING";
    pub const CANCEL_RECEIVED_CONFIRMED: &str = "CANCEL_RECEIVED_CONFIRMED";

    // failure path
    pub const REVERTED: &str = "REVERTED";
    pub const FAILED: &str = "FAILED";
    pub const CHARGEBACK: &str = "CHARGEBACK";
    pub const DEAD_LETTER: &str = "DEAD_LETTER";
}

/// Topic consumed by the given SMS provider.
pub fn sms_provider_topic(provider: &str) -> String {
    format!("{}.{}.{}", Domain::Sms.as_str(), names::SEND, provider.to_uppercase())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeaders {
    pub request_id: Option<String>,
}

/// Wire shape of every bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub key: String,
    #[serde(default)]
    pub headers: EventHeaders,
    pub value: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            headers: EventHeaders {
                request_id: Some(Uuid::new_v4().to_string()),
            },
            value,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.headers.request_id = request_id;
        self
    }
}

/// Minimal payload of entity events: every serialized entity carries its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
}

/// Event produced by a controller, published by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub topic: String,
    pub key: String,
    pub value: serde_json::Value,
}

impl OutboundEvent {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value,
        }
    }

    /// Event carrying the whole entity, keyed by its id.
    pub fn entity<E: SagaEntity>(domain: Domain, event: &str, entity: &E) -> Result<Self, SagaError> {
        Ok(Self::new(
            domain.topic(event),
            entity.id().to_string(),
            serde_json::to_value(entity)?,
        ))
    }

    pub fn into_envelope(self, request_id: Option<String>) -> EventEnvelope {
        EventEnvelope {
            key: self.key,
            headers: EventHeaders { request_id },
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_naming() {
        assert_eq!(Domain::Payment.topic(names::PENDING), "PAYMENT.PENDING");
        assert_eq!(
            Domain::RefundDevolution.topic(names::DEAD_LETTER),
            "REFUND_DEVOLUTION.DEAD_LETTER"
        );
        assert_eq!(sms_provider_topic("zenvia"), "SMS.SEND.ZENVIA");
    }

    #[test]
    fn test_envelope_headers_default_when_missing() {
        let raw = r#"{"key":"k","value":{"id":"x"}}"#;
        let envelope: EventEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.headers.request_id, None);
    }

    #[test]
    fn test_envelope_request_id_is_camel_case() {
        let envelope = EventEnvelope::new("k", serde_json::json!({})).with_request_id(Some("r-1".into()));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["headers"]["requestId"], "r-1");
    }
}
