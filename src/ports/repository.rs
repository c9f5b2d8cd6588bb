use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{PixDevolution, SagaEntity};
use crate::error::RepositoryResult;

/// Direction of the `updated_at` comparison used by reconciliation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdComparison {
    BeforeThan,
    AfterThan,
}

impl ThresholdComparison {
    pub fn matches(&self, value: DateTime<Utc>, threshold: DateTime<Utc>) -> bool {
        match self {
            ThresholdComparison::BeforeThan => value < threshold,
            ThresholdComparison::AfterThan => value > threshold,
        }
    }
}

/// Storage contract shared by every saga entity.
///
/// `find_by_field` addresses a field of the serialized entity by its path,
/// e.g. `&["endToEndId"]` or `&["operation", "id"]`, and compares its textual
/// value.
#[async_trait]
pub trait EntityRepository<E: SagaEntity>: Send + Sync {
    async fn create(&self, entity: &E) -> RepositoryResult<E>;

    async fn update(&self, entity: &E) -> RepositoryResult<E>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<E>>;

    async fn find_by_field(&self, path: &[&str], value: &str) -> RepositoryResult<Vec<E>>;

    async fn find_one_by_field(&self, path: &[&str], value: &str) -> RepositoryResult<Option<E>> {
        Ok(self.find_by_field(path, value).await?.into_iter().next())
    }

    async fn get_all_by_state(&self, state: E::State) -> RepositoryResult<Vec<E>>;

    async fn get_all_by_state_and_threshold_date(
        &self,
        state: E::State,
        threshold: DateTime<Utc>,
        comparison: ThresholdComparison,
    ) -> RepositoryResult<Vec<E>>;

    /// Compare-and-set on the state column. Returns `false` when the stored
    /// state was not `expected`.
    async fn update_state_if(
        &self,
        id: Uuid,
        expected: E::State,
        next: E::State,
    ) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait DevolutionRepositoryExt {
    /// Sum of the devolutions of a deposit that still hold (or moved) money.
    async fn total_devolution_amount_by_deposit(&self, deposit_id: Uuid) -> RepositoryResult<i64>;
}

#[async_trait]
impl<R> DevolutionRepositoryExt for R
where
    R: EntityRepository<PixDevolution> + ?Sized,
{
    async fn total_devolution_amount_by_deposit(&self, deposit_id: Uuid) -> RepositoryResult<i64> {
        let devolutions = self
            .find_by_field(&["depositId"], &deposit_id.to_string())
            .await?;
        Ok(devolutions
            .iter()
            .filter(|devolution| !devolution.releases_amount())
            .map(|devolution| devolution.amount)
            .sum())
    }
}
