//! Scheme rejection reasons ("chargebacks") and how they map to failure
//! records shown to the user.

use crate::domain::FailedRecord;
use crate::ports::Translator;

/// Translation domain holding one message per chargeback code.
pub const CHARGEBACK_TRANSLATION_DOMAIN: &str = "chargeback_exceptions";

/// A known scheme reason, carried as data rather than thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargebackException {
    pub name: &'static str,
    pub code: &'static str,
    pub description: &'static str,
}

impl ChargebackException {
    pub fn is_default(&self) -> bool {
        self.code == DEFAULT_CHARGEBACK.code
    }

    pub fn to_failed(&self, translator: &dyn Translator) -> FailedRecord {
        FailedRecord::new(
            self.code,
            translator.translate(CHARGEBACK_TRANSLATION_DOMAIN, self.code, &[]),
        )
    }
}

macro_rules! chargebacks {
    ($($reason:literal => $description:literal),+ $(,)?) => {
        &[$(
            ChargebackException {
                name: concat!("Chargeback", $reason, "Exception"),
                code: concat!("CHARGEBACK_", $reason),
                description: $description,
            },
        )+]
    };
}

pub const DEFAULT_CHARGEBACK: ChargebackException = ChargebackException {
    name: "ChargebackDefaultException",
    code: "CHARGEBACK_DEFAULT",
    description: "Transfer rejected by the receiving institution",
};

static REGISTRY: &[ChargebackException] = chargebacks! {
    "AB03" => "Settlement aborted by timeout",
    "AB09" => "Transfer rejected by the receiving institution",
    "AB11" => "Receiving institution timed out",
    "AC03" => "Invalid beneficiary account number",
    "AC06" => "Beneficiary account is blocked",
    "AC07" => "Beneficiary account is closed",
    "AC14" => "Invalid beneficiary account type",
    "AG03" => "Transaction type not supported by the beneficiary account",
    "AG12" => "Payment type not allowed for the beneficiary",
    "AG13" => "Transaction forbidden for the beneficiary account",
    "AGNT" => "Incorrect participant agent",
    "AM01" => "Zero amount",
    "AM02" => "Amount above the allowed limit",
    "AM04" => "Insufficient funds",
    "AM09" => "Amount does not match the agreed value",
    "AM12" => "Invalid amount",
    "AM18" => "Invalid number of transactions",
    "BE01" => "Beneficiary document does not match the account",
    "BE17" => "Invalid beneficiary identifier",
    "CH11" => "Invalid payer identifier",
    "CH16" => "Malformed transfer content",
    "DS04" => "Order rejected by the receiving institution",
    "DS0G" => "Payer not allowed to send this transfer",
    "DS0H" => "Beneficiary account not allowed to receive this transfer",
    "DS24" => "Waiting time expired",
    "DS27" => "Beneficiary not yet enabled for Pix",
    "DT05" => "Invalid settlement date",
    "ED05" => "Settlement failed",
    "FF07" => "Invalid transfer purpose",
    "FF08" => "Invalid end to end id",
    "MD01" => "No authorization for the transfer",
    "RC09" => "Invalid payer institution",
    "RC10" => "Invalid beneficiary institution",
    "RR04" => "Rejected for regulatory reasons",
    "SL02" => "Service not offered by the receiving institution",
};

/// Every registered exception, default excluded.
pub fn registry() -> &'static [ChargebackException] {
    REGISTRY
}

/// Resolves a scheme reason code. Total: unknown or malformed codes,
/// including the empty string, resolve to [`DEFAULT_CHARGEBACK`].
pub fn resolve_chargeback(reason: &str) -> ChargebackException {
    let name = format!("Chargeback{}Exception", reason.trim().to_uppercase());
    REGISTRY
        .iter()
        .find(|exception| exception.name == name)
        .copied()
        .unwrap_or(DEFAULT_CHARGEBACK)
}
