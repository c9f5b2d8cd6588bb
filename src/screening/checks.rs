use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{CheckVerdict, DepositCheck, InstitutionAction, InstitutionRule};
use crate::domain::{digits_only, PixDeposit, WarningReason};
use crate::ports::{CacheStore, UserService};

const DUPLICATE_KEY_PREFIX: &str = "deposit:duplicate:";

/// Cache key identifying deposits with the same content: same payer, same
/// beneficiary account and same amount.
pub fn duplicate_key(deposit: &PixDeposit) -> String {
    let normalized = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        deposit.amount,
        digits_only(&deposit.client.document),
        deposit.client.account_number.trim(),
        digits_only(&deposit.third_part.document),
        deposit.third_part.ispb.trim(),
        deposit.third_part.branch.as_deref().unwrap_or("").trim(),
        deposit.third_part.account_number.trim(),
    );
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{}{}", DUPLICATE_KEY_PREFIX, hex::encode(digest))
}

/// Flags a deposit whose content was already seen from another deposit id.
/// Replays of the same deposit find their own id and stay clear.
pub struct DuplicateDepositCheck {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    min_amount: i64,
}

impl DuplicateDepositCheck {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration, min_amount: i64) -> Self {
        Self {
            cache,
            ttl,
            min_amount,
        }
    }
}

#[async_trait]
impl DepositCheck for DuplicateDepositCheck {
    fn name(&self) -> &'static str {
        "duplicate"
    }

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict {
        let key = duplicate_key(deposit);
        let id = deposit.id.to_string();

        let stored = match self.cache.set_if_absent(&key, &id, self.ttl).await {
            Ok(true) => return CheckVerdict::Clear,
            Ok(false) => self.cache.get(&key).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(Some(owner)) if owner != id && deposit.amount > self.min_amount => {
                CheckVerdict::Flag(WarningReason::Duplicated)
            }
            Ok(_) => CheckVerdict::Clear,
            Err(e) => {
                warn!(entity_id = %deposit.id, error = %e, "duplicate check skipped");
                CheckVerdict::Clear
            }
        }
    }
}

pub struct BlockedDocumentCheck {
    documents: HashSet<String>,
}

impl BlockedDocumentCheck {
    pub fn new(documents: HashSet<String>) -> Self {
        Self {
            documents: documents.iter().map(|d| digits_only(d)).collect(),
        }
    }
}

#[async_trait]
impl DepositCheck for BlockedDocumentCheck {
    fn name(&self) -> &'static str {
        "blocked_document"
    }

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict {
        if self.documents.contains(&digits_only(&deposit.third_part.document)) {
            CheckVerdict::Flag(WarningReason::BlockedDocument)
        } else {
            CheckVerdict::Clear
        }
    }
}

pub struct SuspectBankCheck {
    ispbs: HashSet<String>,
}

impl SuspectBankCheck {
    pub fn new(ispbs: HashSet<String>) -> Self {
        Self { ispbs }
    }
}

#[async_trait]
impl DepositCheck for SuspectBankCheck {
    fn name(&self) -> &'static str {
        "suspect_bank"
    }

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict {
        if self.ispbs.contains(deposit.third_part.ispb.trim()) {
            CheckVerdict::Flag(WarningReason::SuspectBank)
        } else {
            CheckVerdict::Clear
        }
    }
}

/// Payers whose CNPJ root belongs to a public entity.
pub struct GovernmentEntityCheck {
    roots: Vec<String>,
}

impl GovernmentEntityCheck {
    pub fn new(roots: Vec<String>) -> Self {
        Self {
            roots: roots.iter().map(|r| digits_only(r)).filter(|r| !r.is_empty()).collect(),
        }
    }
}

#[async_trait]
impl DepositCheck for GovernmentEntityCheck {
    fn name(&self) -> &'static str {
        "government_entity"
    }

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict {
        let document = digits_only(&deposit.third_part.document);
        // CPFs have 11 digits, only 14-digit CNPJs carry a root.
        if document.len() == 14 && self.roots.iter().any(|root| document.starts_with(root.as_str())) {
            CheckVerdict::Flag(WarningReason::GovernmentEntity)
        } else {
            CheckVerdict::Clear
        }
    }
}

pub struct OverIncomeCheck {
    users: Arc<dyn UserService>,
    percent: i64,
}

impl OverIncomeCheck {
    pub fn new(users: Arc<dyn UserService>, percent: i64) -> Self {
        Self { users, percent }
    }
}

#[async_trait]
impl DepositCheck for OverIncomeCheck {
    fn name(&self) -> &'static str {
        "over_income"
    }

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict {
        match self.users.get_monthly_income(deposit.user_id).await {
            Ok(Some(income)) if income > 0 => {
                let limit = income.saturating_mul(self.percent) / 100;
                if deposit.amount > limit {
                    CheckVerdict::Flag(WarningReason::OverIncome)
                } else {
                    CheckVerdict::Clear
                }
            }
            Ok(_) => CheckVerdict::Clear,
            Err(e) => {
                warn!(entity_id = %deposit.id, error = %e, "over income check skipped");
                CheckVerdict::Clear
            }
        }
    }
}

pub struct InstitutionRuleCheck {
    rules: Vec<InstitutionRule>,
}

impl InstitutionRuleCheck {
    pub fn new(rules: Vec<InstitutionRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl DepositCheck for InstitutionRuleCheck {
    fn name(&self) -> &'static str {
        "institution_rule"
    }

    async fn check(&self, deposit: &PixDeposit) -> CheckVerdict {
        let ispb = deposit.third_part.ispb.trim();
        match self.rules.iter().find(|rule| rule.ispb == ispb) {
            Some(InstitutionRule {
                action: InstitutionAction::Allow,
                ..
            }) => CheckVerdict::Allow,
            Some(InstitutionRule {
                action: InstitutionAction::Deny,
                ..
            }) => CheckVerdict::Flag(WarningReason::InstitutionRule),
            None => CheckVerdict::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PixAccount, PixDepositState};
    use chrono::Utc;
    use uuid::Uuid;

    fn account(document: &str, ispb: &str) -> PixAccount {
        PixAccount {
            name: None,
            document: document.to_string(),
            ispb: ispb.to_string(),
            branch: Some("0001".to_string()),
            account_number: "12345".to_string(),
        }
    }

    fn deposit(payer_document: &str, payer_ispb: &str) -> PixDeposit {
        let now = Utc::now();
        PixDeposit {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            state: PixDepositState::New,
            amount: 10_000,
            end_to_end_id: format!("E{}", Uuid::new_v4().simple()),
            txid: None,
            client: account("12345678909", "99999999"),
            third_part: account(payer_document, payer_ispb),
            description: None,
            is_duplicated: false,
            warning_reasons: Vec::new(),
            operation: None,
            failed: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_duplicate_key_ignores_ids_and_punctuation() {
        let first = deposit("123.456.789-09", "22222222");
        let second = deposit("12345678909", "22222222");
        assert_eq!(duplicate_key(&first), duplicate_key(&second));
        assert!(duplicate_key(&first).starts_with(DUPLICATE_KEY_PREFIX));
    }

    #[test]
    fn test_duplicate_key_changes_with_amount() {
        let first = deposit("12345678909", "22222222");
        let mut second = first.clone();
        second.amount += 1;
        assert_ne!(duplicate_key(&first), duplicate_key(&second));
    }

    #[tokio::test]
    async fn test_duplicate_must_exceed_min_amount() {
        let at_threshold = DuplicateDepositCheck::new(
            Arc::new(crate::adapters::InMemoryCache::new()),
            Duration::from_secs(60),
            10_000,
        );
        let first = deposit("12345678909", "22222222");
        let mut second = first.clone();
        second.id = Uuid::new_v4();
        assert_eq!(at_threshold.check(&first).await, CheckVerdict::Clear);
        assert_eq!(at_threshold.check(&second).await, CheckVerdict::Clear);

        let below = DuplicateDepositCheck::new(
            Arc::new(crate::adapters::InMemoryCache::new()),
            Duration::from_secs(60),
            9_999,
        );
        assert_eq!(below.check(&first).await, CheckVerdict::Clear);
        assert_eq!(below.check(&first).await, CheckVerdict::Clear);
        assert_eq!(
            below.check(&second).await,
            CheckVerdict::Flag(WarningReason::Duplicated)
        );
    }

    #[tokio::test]
    async fn test_government_root_only_matches_cnpj() {
        let check = GovernmentEntityCheck::new(vec!["00.394.460".to_string()]);
        let cnpj = deposit("00.394.460/0058-87", "22222222");
        assert_eq!(
            check.check(&cnpj).await,
            CheckVerdict::Flag(WarningReason::GovernmentEntity)
        );
        let cpf = deposit("00394460058", "22222222");
        assert_eq!(check.check(&cpf).await, CheckVerdict::Clear);
    }

    #[tokio::test]
    async fn test_institution_rules() {
        let check = InstitutionRuleCheck::new(vec![
            InstitutionRule {
                ispb: "11111111".to_string(),
                action: InstitutionAction::Allow,
            },
            InstitutionRule {
                ispb: "33333333".to_string(),
                action: InstitutionAction::Deny,
            },
        ]);
        assert_eq!(check.check(&deposit("1", "11111111")).await, CheckVerdict::Allow);
        assert_eq!(
            check.check(&deposit("1", "33333333")).await,
            CheckVerdict::Flag(WarningReason::InstitutionRule)
        );
        assert_eq!(check.check(&deposit("1", "44444444")).await, CheckVerdict::Clear);
    }

    #[tokio::test]
    async fn test_blocked_document_normalizes() {
        let check = BlockedDocumentCheck::new(["987.654.321-00".to_string()].into_iter().collect());
        assert_eq!(
            check.check(&deposit("98765432100", "22222222")).await,
            CheckVerdict::Flag(WarningReason::BlockedDocument)
        );
    }
}
