//! Runs against a real database. Skipped when DATABASE_URL is not set.

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use pix_saga_core::adapters::PostgresEntityRepository;
use pix_saga_core::db::run_migrations;
use pix_saga_core::domain::{Payment, PaymentState, PixAccount, SagaEntity};
use pix_saga_core::error::RepositoryError;
use pix_saga_core::ports::{EntityRepository, ThresholdComparison};

async fn pool() -> anyhow::Result<Option<PgPool>> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;
    Ok(Some(pool))
}

fn payment(end_to_end_id: &str) -> Payment {
    let mut payment = Payment::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        4_200,
        PixAccount {
            name: None,
            document: "12345678909".to_string(),
            ispb: "60701190".to_string(),
            branch: None,
            account_number: "99887766".to_string(),
        },
        None,
        None,
    );
    payment.end_to_end_id = Some(end_to_end_id.to_string());
    payment
}

#[tokio::test]
async fn test_create_is_unique_per_id() -> anyhow::Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let repository = PostgresEntityRepository::<Payment>::new(pool);
    let payment = payment(&format!("E{}", Uuid::new_v4().simple()));

    let stored = repository.create(&payment).await?;
    assert_eq!(stored.id, payment.id);

    let duplicate = repository.create(&payment).await;
    assert!(matches!(duplicate, Err(RepositoryError::Conflict(id)) if id == payment.id));
    Ok(())
}

#[tokio::test]
async fn test_find_by_nested_field() -> anyhow::Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let repository = PostgresEntityRepository::<Payment>::new(pool);
    let end_to_end_id = format!("E{}", Uuid::new_v4().simple());
    let payment = payment(&end_to_end_id);
    repository.create(&payment).await?;

    let by_e2e = repository.find_one_by_field(&["endToEndId"], &end_to_end_id).await?;
    assert_eq!(by_e2e.map(|p| p.id), Some(payment.id));

    let by_owner = repository
        .find_by_field(&["userId"], &payment.user_id.to_string())
        .await?;
    assert_eq!(by_owner.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_update_state_if_is_compare_and_set() -> anyhow::Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let repository = PostgresEntityRepository::<Payment>::new(pool);
    let payment = payment(&format!("E{}", Uuid::new_v4().simple()));
    repository.create(&payment).await?;

    assert!(
        repository
            .update_state_if(payment.id, PaymentState::Pending, PaymentState::Waiting)
            .await?
    );
    assert!(
        !repository
            .update_state_if(payment.id, PaymentState::Pending, PaymentState::Waiting)
            .await?
    );

    let stored = repository.get_by_id(payment.id).await?.expect("payment stored");
    assert_eq!(stored.state(), PaymentState::Waiting);

    let missing = repository
        .update_state_if(Uuid::new_v4(), PaymentState::Pending, PaymentState::Waiting)
        .await;
    assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_threshold_query_selects_stale_entities() -> anyhow::Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let repository = PostgresEntityRepository::<Payment>::new(pool);
    let payment = payment(&format!("E{}", Uuid::new_v4().simple()));
    repository.create(&payment).await?;

    let stale = repository
        .get_all_by_state_and_threshold_date(
            PaymentState::Pending,
            Utc::now() + Duration::minutes(1),
            ThresholdComparison::BeforeThan,
        )
        .await?;
    assert!(stale.iter().any(|p| p.id == payment.id));

    let fresh = repository
        .get_all_by_state_and_threshold_date(
            PaymentState::Pending,
            Utc::now() + Duration::minutes(1),
            ThresholdComparison::AfterThan,
        )
        .await?;
    assert!(!fresh.iter().any(|p| p.id == payment.id));
    Ok(())
}
