//! Resolution of the polymorphic transaction an infraction or refund points at.

use uuid::Uuid;

use crate::domain::{OperationRef, TransactionKind, TransactionRef};
use crate::error::SagaError;
use crate::saga::SagaContext;

/// The fields disputes need from any money-movement entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransaction {
    pub reference: TransactionRef,
    pub user_id: Uuid,
    pub amount: i64,
    pub end_to_end_id: Option<String>,
    pub operation: Option<OperationRef>,
}

pub async fn resolve_reference(
    ctx: &SagaContext,
    reference: TransactionRef,
) -> Result<Option<ResolvedTransaction>, SagaError> {
    let repositories = &ctx.repositories;
    let resolved = match reference.kind {
        TransactionKind::Payment => repositories
            .payments
            .get_by_id(reference.id)
            .await?
            .map(|payment| ResolvedTransaction {
                reference,
                user_id: payment.user_id,
                amount: payment.value,
                end_to_end_id: payment.end_to_end_id,
                operation: payment.operation,
            }),
        TransactionKind::PixDeposit => repositories
            .deposits
            .get_by_id(reference.id)
            .await?
            .map(|deposit| ResolvedTransaction {
                reference,
                user_id: deposit.user_id,
                amount: deposit.amount,
                end_to_end_id: Some(deposit.end_to_end_id),
                operation: deposit.operation,
            }),
        TransactionKind::PixDevolution => repositories
            .devolutions
            .get_by_id(reference.id)
            .await?
            .map(|devolution| ResolvedTransaction {
                reference,
                user_id: devolution.user_id,
                amount: devolution.amount,
                end_to_end_id: devolution.end_to_end_id,
                operation: devolution.operation,
            }),
        TransactionKind::PixDevolutionReceived => repositories
            .devolutions_received
            .get_by_id(reference.id)
            .await?
            .map(|devolution| ResolvedTransaction {
                reference,
                user_id: devolution.user_id,
                amount: devolution.amount,
                end_to_end_id: Some(devolution.end_to_end_id),
                operation: devolution.operation,
            }),
    };
    Ok(resolved)
}

/// Looks the end-to-end id up across every transaction kind, credits first.
pub async fn resolve_by_end_to_end_id(
    ctx: &SagaContext,
    end_to_end_id: &str,
) -> Result<Option<ResolvedTransaction>, SagaError> {
    let repositories = &ctx.repositories;
    let path: &[&str] = &["endToEndId"];

    if let Some(deposit) = repositories.deposits.find_one_by_field(path, end_to_end_id).await? {
        return resolve_reference(ctx, TransactionRef::new(TransactionKind::PixDeposit, deposit.id)).await;
    }
    if let Some(devolution) = repositories
        .devolutions_received
        .find_one_by_field(path, end_to_end_id)
        .await?
    {
        return resolve_reference(
            ctx,
            TransactionRef::new(TransactionKind::PixDevolutionReceived, devolution.id),
        )
        .await;
    }
    if let Some(payment) = repositories.payments.find_one_by_field(path, end_to_end_id).await? {
        return resolve_reference(ctx, TransactionRef::new(TransactionKind::Payment, payment.id)).await;
    }
    if let Some(devolution) = repositories.devolutions.find_one_by_field(path, end_to_end_id).await? {
        return resolve_reference(ctx, TransactionRef::new(TransactionKind::PixDevolution, devolution.id))
            .await;
    }
    Ok(None)
}
