//! Postgres implementation of EntityRepository.
//!
//! All saga entities share the `saga_entities` table. The serialized entity
//! sits in `body`; `state`, `created_at` and `updated_at` are mirrored into
//! columns so reconciliation scans stay indexed.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{SagaEntity, SagaState};
use crate::error::{RepositoryError, RepositoryResult};
use crate::ports::{EntityRepository, ThresholdComparison};

/// Postgres-backed repository for one entity kind.
pub struct PostgresEntityRepository<E: SagaEntity> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: SagaEntity> Clone for PostgresEntityRepository<E> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<E: SagaEntity> PostgresEntityRepository<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: SagaEntity> EntityRepository<E> for PostgresEntityRepository<E> {
    async fn create(&self, entity: &E) -> RepositoryResult<E> {
        let body = serde_json::to_value(entity)?;
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            INSERT INTO saga_entities (kind, id, state, created_at, updated_at, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kind, id) DO NOTHING
            RETURNING body
            "#,
        )
        .bind(E::KIND)
        .bind(entity.id())
        .bind(entity.state().as_str())
        .bind(entity.created_at())
        .bind(entity.updated_at())
        .bind(body)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.ok_or(RepositoryError::Conflict(entity.id()))?.into_domain()
    }

    async fn update(&self, entity: &E) -> RepositoryResult<E> {
        let body = serde_json::to_value(entity)?;
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            UPDATE saga_entities
            SET state = $3, updated_at = $4, body = $5
            WHERE kind = $1 AND id = $2
            RETURNING body
            "#,
        )
        .bind(E::KIND)
        .bind(entity.id())
        .bind(entity.state().as_str())
        .bind(entity.updated_at())
        .bind(body)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.ok_or(RepositoryError::NotFound(entity.id()))?.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<E>> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT body FROM saga_entities WHERE kind = $1 AND id = $2",
        )
        .bind(E::KIND)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(EntityRow::into_domain).transpose()
    }

    async fn find_by_field(&self, path: &[&str], value: &str) -> RepositoryResult<Vec<E>> {
        let path: Vec<String> = path.iter().map(|segment| segment.to_string()).collect();
        let rows = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT body FROM saga_entities
            WHERE kind = $1 AND body #>> $2 = $3
            ORDER BY created_at
            "#,
        )
        .bind(E::KIND)
        .bind(path)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter().map(EntityRow::into_domain).collect()
    }

    async fn get_all_by_state(&self, state: E::State) -> RepositoryResult<Vec<E>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT body FROM saga_entities WHERE kind = $1 AND state = $2 ORDER BY created_at",
        )
        .bind(E::KIND)
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter().map(EntityRow::into_domain).collect()
    }

    async fn get_all_by_state_and_threshold_date(
        &self,
        state: E::State,
        threshold: DateTime<Utc>,
        comparison: ThresholdComparison,
    ) -> RepositoryResult<Vec<E>> {
        let query = match comparison {
            ThresholdComparison::BeforeThan => {
                "SELECT body FROM saga_entities WHERE kind = $1 AND state = $2 AND updated_at < $3 ORDER BY created_at"
            }
            ThresholdComparison::AfterThan => {
                "SELECT body FROM saga_entities WHERE kind = $1 AND state = $2 AND updated_at > $3 ORDER BY created_at"
            }
        };
        let rows = sqlx::query_as::<_, EntityRow>(query)
            .bind(E::KIND)
            .bind(state.as_str())
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        rows.into_iter().map(EntityRow::into_domain).collect()
    }

    async fn update_state_if(&self, id: Uuid, expected: E::State, next: E::State) -> RepositoryResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE saga_entities
            SET state = $4,
                updated_at = $5,
                body = jsonb_set(jsonb_set(body, '{state}', to_jsonb($4::text)), '{updatedAt}', to_jsonb($5))
            WHERE kind = $1 AND id = $2 AND state = $3
            "#,
        )
        .bind(E::KIND)
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(id)),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntityRow {
    body: serde_json::Value,
}

impl EntityRow {
    fn into_domain<E: SagaEntity>(self) -> RepositoryResult<E> {
        Ok(serde_json::from_value(self.body)?)
    }
}
