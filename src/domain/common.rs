use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure reason attached to an entity: stable code plus translated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub code: String,
    pub message: String,
}

impl FailedRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FailedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Reference to a ledger operation owned by the external Operation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRef {
    pub id: Uuid,
    pub value: i64,
}

/// Counterpart account data as exchanged with the payment scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixAccount {
    pub name: Option<String>,
    pub document: String,
    pub ispb: String,
    pub branch: Option<String>,
    pub account_number: String,
}

/// Kind of transaction an infraction or refund points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Payment,
    PixDeposit,
    PixDevolution,
    PixDevolutionReceived,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Payment => "PAYMENT",
            TransactionKind::PixDeposit => "PIX_DEPOSIT",
            TransactionKind::PixDevolution => "PIX_DEVOLUTION",
            TransactionKind::PixDevolutionReceived => "PIX_DEVOLUTION_RECEIVED",
        }
    }

    /// Credits are money that arrived at our customer; only those can be
    /// refunded back to the payer.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::PixDeposit | TransactionKind::PixDevolutionReceived
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic pointer to one of the money-movement entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRef {
    pub kind: TransactionKind,
    pub id: Uuid,
}

impl TransactionRef {
    pub fn new(kind: TransactionKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Keeps only ASCII digits, used for CPF/CNPJ comparisons.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}
