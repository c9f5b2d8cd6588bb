//! Deposit screening: independent checks run concurrently, their verdicts
//! folded into the reasons a deposit must be held for compliance analysis.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

use crate::domain::{PixDeposit, WarningReason};
use crate::saga::SagaContext;

mod checks;

pub use checks::{
    duplicate_key, BlockedDocumentCheck, DuplicateDepositCheck, GovernmentEntityCheck,
    InstitutionRuleCheck, OverIncomeCheck, SuspectBankCheck,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstitutionAction {
    Allow,
    Deny,
}

/// Per-institution override, matched on the payer's ISPB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionRule {
    pub ispb: String,
    pub action: InstitutionAction,
}

#[derive(Debug, Clone)]
pub struct ScreeningSettings {
    pub duplicate_ttl: Duration,
    /// Duplicates below this amount (cents) are let through.
    pub duplicate_min_amount: i64,
    pub blocked_documents: HashSet<String>,
    pub suspect_banks: HashSet<String>,
    /// First eight CNPJ digits of public entities.
    pub government_cnpj_roots: Vec<String>,
    /// Flag when the amount exceeds this percentage of the declared monthly income.
    pub over_income_percent: i64,
    pub institution_rules: Vec<InstitutionRule>,
}

impl Default for ScreeningSettings {
    fn default() -> Self {
        Self {
            duplicate_ttl: Duration::from_secs(24 * 3600),
            duplicate_min_amount: 0,
            blocked_documents: HashSet::new(),
            suspect_banks: HashSet::new(),
            government_cnpj_roots: Vec::new(),
            over_income_percent: 200,
            institution_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVerdict {
    Clear,
    Flag(WarningReason),
    /// Exempts the deposit from the list-based checks.
    Allow,
}

#[async_trait]
pub trait DepositCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreeningReport {
    pub reasons: Vec<WarningReason>,
    pub is_duplicated: bool,
}

impl ScreeningReport {
    pub fn is_clear(&self) -> bool {
        self.reasons.is_empty()
    }
}

fn is_list_reason(reason: WarningReason) -> bool {
    matches!(
        reason,
        WarningReason::BlockedDocument | WarningReason::SuspectBank | WarningReason::GovernmentEntity
    )
}

pub struct ScreeningPipeline {
    checks: Vec<Box<dyn DepositCheck>>,
}

impl ScreeningPipeline {
    pub fn new(checks: Vec<Box<dyn DepositCheck>>) -> Self {
        Self { checks }
    }

    /// The full set of checks wired to the context's collaborators.
    pub fn from_context(ctx: &SagaContext) -> Self {
        let settings = &ctx.settings.screening;
        Self::new(vec![
            Box::new(DuplicateDepositCheck::new(
                Arc::clone(&ctx.cache),
                settings.duplicate_ttl,
                settings.duplicate_min_amount,
            )),
            Box::new(BlockedDocumentCheck::new(settings.blocked_documents.clone())),
            Box::new(SuspectBankCheck::new(settings.suspect_banks.clone())),
            Box::new(GovernmentEntityCheck::new(settings.government_cnpj_roots.clone())),
            Box::new(OverIncomeCheck::new(
                Arc::clone(&ctx.gateways.users),
                settings.over_income_percent,
            )),
            Box::new(InstitutionRuleCheck::new(settings.institution_rules.clone())),
        ])
    }

    pub async fn screen(&self, deposit: &PixDeposit) -> ScreeningReport {
        let verdicts = join_all(self.checks.iter().map(|check| async move {
            let verdict = check.check(deposit).await;
            debug!(entity_id = %deposit.id, check = check.name(), ?verdict, "deposit check finished");
            verdict
        }))
        .await;

        let allowed = verdicts.contains(&CheckVerdict::Allow);
        let mut report = ScreeningReport::default();
        for verdict in verdicts {
            if let CheckVerdict::Flag(reason) = verdict {
                if allowed && is_list_reason(reason) {
                    continue;
                }
                if reason == WarningReason::Duplicated {
                    report.is_duplicated = true;
                }
                if !report.reasons.contains(&reason) {
                    report.reasons.push(reason);
                }
            }
        }

        if !report.is_clear() {
            info!(entity_id = %deposit.id, reasons = ?report.reasons, "deposit flagged by screening");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(CheckVerdict);

    #[async_trait]
    impl DepositCheck for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn check(&self, _deposit: &PixDeposit) -> CheckVerdict {
            self.0
        }
    }

    fn deposit() -> PixDeposit {
        serde_json::from_value(serde_json::json!({
            "id": "6f1c3a8e-3f2a-4b8e-9a51-6f3a3c2b1d10",
            "userId": "0b4c2d1e-5a6f-4b7c-8d9e-0f1a2b3c4d5e",
            "state": "NEW",
            "amount": 1000,
            "endToEndId": "E0000000020240101",
            "txid": null,
            "client": {"name": null, "document": "12345678909", "ispb": "11111111", "branch": "0001", "accountNumber": "1"},
            "thirdPart": {"name": null, "document": "98765432100", "ispb": "22222222", "branch": "0001", "accountNumber": "2"},
            "description": null,
            "isDuplicated": false,
            "warningReasons": [],
            "operation": null,
            "failed": null,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_clear_when_no_check_flags() {
        let pipeline = ScreeningPipeline::new(vec![
            Box::new(Fixed(CheckVerdict::Clear)),
            Box::new(Fixed(CheckVerdict::Clear)),
        ]);
        assert!(pipeline.screen(&deposit()).await.is_clear());
    }

    #[tokio::test]
    async fn test_allow_exempts_list_checks_only() {
        let pipeline = ScreeningPipeline::new(vec![
            Box::new(Fixed(CheckVerdict::Allow)),
            Box::new(Fixed(CheckVerdict::Flag(WarningReason::SuspectBank))),
            Box::new(Fixed(CheckVerdict::Flag(WarningReason::OverIncome))),
        ]);
        let report = pipeline.screen(&deposit()).await;
        assert_eq!(report.reasons, vec![WarningReason::OverIncome]);
        assert!(!report.is_duplicated);
    }

    #[tokio::test]
    async fn test_duplicate_flag_sets_is_duplicated() {
        let pipeline = ScreeningPipeline::new(vec![
            Box::new(Fixed(CheckVerdict::Flag(WarningReason::Duplicated))),
            Box::new(Fixed(CheckVerdict::Flag(WarningReason::Duplicated))),
        ]);
        let report = pipeline.screen(&deposit()).await;
        assert!(report.is_duplicated);
        assert_eq!(report.reasons, vec![WarningReason::Duplicated]);
    }
}
