//! Devolutions of deposits blocked after compliance analysis. Created by the
//! deposit saga when a warning deposit is rejected.

use uuid::Uuid;

use crate::domain::WarningPixDevolution;
use crate::saga::outbound;
use crate::saga::{SagaContext, SagaResult};

pub async fn handle_pending_warning_devolution(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<WarningPixDevolution> {
    outbound::handle_pending(ctx, id).await
}

pub async fn handle_waiting_warning_devolution(
    ctx: &SagaContext,
    id: Uuid,
    end_to_end_id: Option<String>,
) -> SagaResult<WarningPixDevolution> {
    outbound::handle_waiting(ctx, id, end_to_end_id).await
}

pub async fn handle_revert_warning_devolution(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<WarningPixDevolution> {
    outbound::handle_revert(ctx, id).await
}

pub async fn handle_chargeback_warning_devolution(
    ctx: &SagaContext,
    id: Uuid,
    reason: &str,
) -> SagaResult<WarningPixDevolution> {
    outbound::handle_chargeback(ctx, id, reason).await
}

pub async fn handle_dead_letter_warning_devolution(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<WarningPixDevolution> {
    outbound::handle_dead_letter(ctx, id).await
}

pub async fn sync_waiting_warning_devolution(
    ctx: &SagaContext,
    id: Uuid,
) -> SagaResult<WarningPixDevolution> {
    outbound::sync_waiting(ctx, id).await
}
