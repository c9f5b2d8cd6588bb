mod common;

use uuid::Uuid;

use common::{account, topics, unavailable, Harness};
use pix_saga_core::domain::{
    FraudType, PersonType, PixDevolutionReceivedState, PixFraudDetectionState,
    PixFraudDetectionStatus, PixInfractionAnalysisResult, PixInfractionState, PixInfractionStatus,
    PixInfractionType, SagaEntity, TransactionKind, TransactionRef,
};
use pix_saga_core::error::{DomainError, SagaError};
use pix_saga_core::ports::EntityRepository;
use pix_saga_core::saga::deposit::{handle_new_deposit, receive_deposit, ReceiveDepositRequest};
use pix_saga_core::saga::devolution_received::{
    handle_failed_devolution_received, handle_ready_devolution_received, receive_devolution,
    ReceiveDevolutionRequest,
};
use pix_saga_core::saga::fraud_detection::{
    cancel_received_fraud_detection, cancel_registered_fraud_detection,
    handle_cancel_received_pending_fraud_detection,
    handle_cancel_registered_pending_fraud_detection, handle_received_pending_fraud_detection,
    handle_register_pending_fraud_detection, handle_revert_fraud_detection,
    receive_fraud_detection, register_fraud_detection, CancelReceivedFraudDetectionRequest,
    ReceiveFraudDetectionRequest, RegisterFraudDetectionRequest,
};
use pix_saga_core::saga::infraction::{
    cancel_infraction, close_infraction, create_infraction, handle_cancel_pending_infraction,
    handle_close_notification, handle_close_pending_infraction, handle_open_pending_infraction,
    handle_receive_pending_infraction, handle_revert_infraction, open_infraction,
    receive_infraction, CloseInfractionRequest, CreateInfractionRequest,
    InfractionClosedNotification, ReceiveInfractionRequest,
};
use pix_saga_core::saga::payment::{
    create_payment, handle_pending_payment, handle_waiting_payment, CreatePaymentRequest,
};

/// A credited deposit; returns its id and end-to-end id.
async fn received_deposit(harness: &Harness) -> (Uuid, String) {
    let id = Uuid::new_v4();
    let end_to_end_id = format!("E{}", id.simple());
    let request = ReceiveDepositRequest {
        id,
        user_id: Uuid::new_v4(),
        amount: 2_500,
        end_to_end_id: end_to_end_id.clone(),
        txid: None,
        client: account("98765432100", "12345678", "123456"),
        third_part: account("12345678909", "60701190", "99887766"),
        description: None,
    };
    receive_deposit(&harness.ctx, request).await.unwrap();
    handle_new_deposit(&harness.ctx, id).await.unwrap();
    (id, end_to_end_id)
}

/// A confirmed outbound payment of 10_000; returns its end-to-end id.
async fn confirmed_payment(harness: &Harness) -> String {
    let id = Uuid::new_v4();
    let end_to_end_id = format!("E2E-{}", id.simple());
    let request = CreatePaymentRequest {
        id,
        user_id: Uuid::new_v4(),
        value: 10_000,
        beneficiary: account("12345678909", "60701190", "99887766"),
        description: None,
        payment_date: None,
    };
    create_payment(&harness.ctx, request).await.unwrap();
    handle_pending_payment(&harness.ctx, id).await.unwrap();
    handle_waiting_payment(&harness.ctx, id, Some(end_to_end_id.clone()))
        .await
        .unwrap();
    end_to_end_id
}

async fn infraction_state(harness: &Harness, id: Uuid) -> PixInfractionState {
    harness
        .ctx
        .repositories
        .infractions
        .get_by_id(id)
        .await
        .unwrap()
        .expect("infraction persisted")
        .state()
}

async fn fraud_state(harness: &Harness, id: Uuid) -> PixFraudDetectionState {
    harness
        .ctx
        .repositories
        .fraud_detections
        .get_by_id(id)
        .await
        .unwrap()
        .expect("fraud detection persisted")
        .state()
}

fn register_request(document: &str) -> RegisterFraudDetectionRequest {
    RegisterFraudDetectionRequest {
        id: Uuid::new_v4(),
        person_type: PersonType::NaturalPerson,
        document: document.to_string(),
        fraud_type: FraudType::DummyAccount,
        key: None,
    }
}

#[tokio::test]
async fn test_reported_infraction_opens_at_the_scheme() {
    let harness = Harness::new();
    let (deposit_id, end_to_end_id) = received_deposit(&harness).await;
    let id = Uuid::new_v4();

    let created = create_infraction(
        &harness.ctx,
        CreateInfractionRequest {
            id,
            infraction_type: PixInfractionType::Fraud,
            transaction: TransactionRef::new(TransactionKind::PixDeposit, deposit_id),
            description: Some("unknown payer".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(topics(&created), vec!["INFRACTION.NEW_CONFIRMED"]);
    assert_eq!(created.entity().unwrap().end_to_end_id, end_to_end_id);

    let opening = open_infraction(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&opening), vec!["INFRACTION.OPEN_PENDING"]);

    let opened = handle_open_pending_infraction(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&opened), vec!["INFRACTION.OPEN_CONFIRMED"]);
    let infraction = opened.entity().unwrap();
    assert_eq!(infraction.status, PixInfractionStatus::Open);
    assert_eq!(
        infraction.infraction_psp_id.as_deref(),
        Some(format!("psp-infraction-{}", id.simple()).as_str())
    );

    let closed = handle_close_notification(
        &harness.ctx,
        InfractionClosedNotification {
            infraction_psp_id: format!("psp-infraction-{}", id.simple()),
            analysis_result: PixInfractionAnalysisResult::Agreed,
            analysis_details: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(topics(&closed), vec!["INFRACTION.CLOSE_CONFIRMED"]);
    assert_eq!(infraction_state(&harness, id).await, PixInfractionState::CloseConfirmed);
}

#[tokio::test]
async fn test_infraction_needs_a_known_transaction() {
    let harness = Harness::new();

    let result = create_infraction(
        &harness.ctx,
        CreateInfractionRequest {
            id: Uuid::new_v4(),
            infraction_type: PixInfractionType::RequestRefund,
            transaction: TransactionRef::new(TransactionKind::PixDeposit, Uuid::new_v4()),
            description: None,
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(SagaError::Domain(DomainError::NotFound { entity: "transaction", .. }))
    ));
}

#[tokio::test]
async fn test_received_infraction_is_analysed_and_closed() {
    let harness = Harness::new();
    let (deposit_id, end_to_end_id) = received_deposit(&harness).await;
    let id = Uuid::new_v4();

    let received = receive_infraction(
        &harness.ctx,
        ReceiveInfractionRequest {
            id,
            infraction_psp_id: "psp-received-1".to_string(),
            infraction_type: PixInfractionType::Fraud,
            end_to_end_id,
            description: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(topics(&received), vec!["INFRACTION.RECEIVE_PENDING"]);
    assert_eq!(
        received.entity().unwrap().transaction,
        TransactionRef::new(TransactionKind::PixDeposit, deposit_id)
    );

    let ticketed = handle_receive_pending_infraction(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&ticketed), vec!["INFRACTION.RECEIVE_CONFIRMED"]);
    assert_eq!(
        ticketed.entity().unwrap().issue_id.as_deref(),
        Some(format!("ISSUE-{}", id.simple()).as_str())
    );

    let closing = close_infraction(
        &harness.ctx,
        CloseInfractionRequest {
            id,
            analysis_result: PixInfractionAnalysisResult::Disagreed,
            analysis_details: Some("legitimate transfer".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(topics(&closing), vec!["INFRACTION.CLOSE_PENDING"]);

    // A failing ticket update does not hold back the close.
    harness.issues.script.fail("update_issue", unavailable());
    let closed = handle_close_pending_infraction(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&closed), vec!["INFRACTION.CLOSE_CONFIRMED"]);
    let infraction = closed.entity().unwrap();
    assert_eq!(infraction.status, PixInfractionStatus::Closed);
    assert_eq!(
        infraction.analysis_result,
        Some(PixInfractionAnalysisResult::Disagreed)
    );
    assert_eq!(harness.pix.script.calls("close_infraction"), 1);
}

#[tokio::test]
async fn test_received_infraction_replay_is_ignored() {
    let harness = Harness::new();
    let (_, end_to_end_id) = received_deposit(&harness).await;
    let request = |id| ReceiveInfractionRequest {
        id,
        infraction_psp_id: "psp-received-2".to_string(),
        infraction_type: PixInfractionType::RequestRefund,
        end_to_end_id: end_to_end_id.clone(),
        description: None,
    };

    receive_infraction(&harness.ctx, request(Uuid::new_v4())).await.unwrap();
    let replay = receive_infraction(&harness.ctx, request(Uuid::new_v4())).await.unwrap();

    assert!(replay.is_ignored());
}

#[tokio::test]
async fn test_cancel_infraction_depends_on_whether_it_was_opened() {
    let harness = Harness::new();
    let (deposit_id, _) = received_deposit(&harness).await;
    let create = |id| CreateInfractionRequest {
        id,
        infraction_type: PixInfractionType::CancelDevolution,
        transaction: TransactionRef::new(TransactionKind::PixDeposit, deposit_id),
        description: None,
    };

    let local = Uuid::new_v4();
    create_infraction(&harness.ctx, create(local)).await.unwrap();
    let canceled = cancel_infraction(&harness.ctx, local).await.unwrap();
    assert_eq!(topics(&canceled), vec!["INFRACTION.CANCEL_CONFIRMED"]);
    assert_eq!(canceled.entity().unwrap().status, PixInfractionStatus::Canceled);

    let opened = Uuid::new_v4();
    create_infraction(&harness.ctx, create(opened)).await.unwrap();
    open_infraction(&harness.ctx, opened).await.unwrap();
    handle_open_pending_infraction(&harness.ctx, opened).await.unwrap();

    let pending = cancel_infraction(&harness.ctx, opened).await.unwrap();
    assert_eq!(topics(&pending), vec!["INFRACTION.CANCEL_PENDING"]);
    let confirmed = handle_cancel_pending_infraction(&harness.ctx, opened).await.unwrap();
    assert_eq!(topics(&confirmed), vec!["INFRACTION.CANCEL_CONFIRMED"]);
    assert_eq!(harness.pix.script.calls("cancel_infraction"), 1);
}

#[tokio::test]
async fn test_infraction_scheme_failure_reverts_to_error() {
    let harness = Harness::new();
    let (deposit_id, _) = received_deposit(&harness).await;
    let id = Uuid::new_v4();
    create_infraction(
        &harness.ctx,
        CreateInfractionRequest {
            id,
            infraction_type: PixInfractionType::Fraud,
            transaction: TransactionRef::new(TransactionKind::PixDeposit, deposit_id),
            description: None,
        },
    )
    .await
    .unwrap();
    open_infraction(&harness.ctx, id).await.unwrap();

    harness.pix.script.fail("create_infraction", unavailable());
    let failed = handle_open_pending_infraction(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&failed), vec!["INFRACTION.REVERTED"]);
    assert_eq!(failed.failed().map(|f| f.code.as_str()), Some("GATEWAY_UNAVAILABLE"));
    assert_eq!(infraction_state(&harness, id).await, PixInfractionState::OpenPending);

    let reverted = handle_revert_infraction(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&reverted), vec!["INFRACTION.ERROR"]);
    assert_eq!(infraction_state(&harness, id).await, PixInfractionState::Error);
}

#[tokio::test]
async fn test_fraud_detection_register_and_cancel() {
    let harness = Harness::new();
    let request = register_request("12345678909");
    let id = request.id;

    let registered = register_fraud_detection(&harness.ctx, request).await.unwrap();
    assert_eq!(topics(&registered), vec!["FRAUD_DETECTION.REGISTER_PENDING"]);

    let confirmed = handle_register_pending_fraud_detection(&harness.ctx, id)
        .await
        .unwrap();
    assert_eq!(topics(&confirmed), vec!["FRAUD_DETECTION.REGISTER_CONFIRMED"]);
    let fraud = confirmed.entity().unwrap();
    assert_eq!(fraud.status, Some(PixFraudDetectionStatus::Registered));
    assert_eq!(
        fraud.external_id.as_deref(),
        Some(format!("psp-fraud-{}", id.simple()).as_str())
    );

    cancel_registered_fraud_detection(&harness.ctx, id).await.unwrap();
    let canceled = handle_cancel_registered_pending_fraud_detection(&harness.ctx, id)
        .await
        .unwrap();
    assert_eq!(
        topics(&canceled),
        vec!["FRAUD_DETECTION.CANCEL_REGISTERED_CONFIRMED"]
    );
    assert_eq!(
        canceled.entity().unwrap().status,
        Some(PixFraudDetectionStatus::CanceledRegistered)
    );
    assert_eq!(harness.pix.script.calls("cancel_fraud_detection"), 1);
}

#[tokio::test]
async fn test_same_subject_cannot_be_registered_twice() {
    let harness = Harness::new();
    let first = register_request("12345678909");
    register_fraud_detection(&harness.ctx, first).await.unwrap();

    let result = register_fraud_detection(&harness.ctx, register_request("12345678909")).await;

    assert!(matches!(
        result,
        Err(SagaError::Domain(DomainError::AlreadyExists { .. }))
    ));
}

#[tokio::test]
async fn test_fraud_detection_failure_reverts_to_failed() {
    let harness = Harness::new();
    let request = register_request("11122233344");
    let id = request.id;
    register_fraud_detection(&harness.ctx, request).await.unwrap();

    harness.pix.script.fail("create_fraud_detection", unavailable());
    let failed = handle_register_pending_fraud_detection(&harness.ctx, id)
        .await
        .unwrap();
    assert_eq!(topics(&failed), vec!["FRAUD_DETECTION.REVERTED"]);

    handle_revert_fraud_detection(&harness.ctx, id).await.unwrap();
    assert_eq!(fraud_state(&harness, id).await, PixFraudDetectionState::Failed);
}

#[tokio::test]
async fn test_received_fraud_detection_is_ticketed_and_withdrawn() {
    let harness = Harness::new();
    let id = Uuid::new_v4();
    let request = ReceiveFraudDetectionRequest {
        id,
        external_id: "scheme-fraud-9".to_string(),
        person_type: PersonType::LegalPerson,
        document: "12345678000199".to_string(),
        fraud_type: FraudType::FraudsterAccount,
        key: Some("pix@example.com".to_string()),
    };

    let received = receive_fraud_detection(&harness.ctx, request.clone())
        .await
        .unwrap();
    assert_eq!(topics(&received), vec!["FRAUD_DETECTION.RECEIVED_PENDING"]);
    assert!(receive_fraud_detection(&harness.ctx, request)
        .await
        .unwrap()
        .is_ignored());

    handle_received_pending_fraud_detection(&harness.ctx, id)
        .await
        .unwrap();
    assert_eq!(fraud_state(&harness, id).await, PixFraudDetectionState::ReceivedConfirmed);

    let withdrawn = cancel_received_fraud_detection(
        &harness.ctx,
        CancelReceivedFraudDetectionRequest {
            external_id: "scheme-fraud-9".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(topics(&withdrawn), vec!["FRAUD_DETECTION.CANCEL_RECEIVED_PENDING"]);

    handle_cancel_received_pending_fraud_detection(&harness.ctx, id)
        .await
        .unwrap();
    assert_eq!(
        fraud_state(&harness, id).await,
        PixFraudDetectionState::CancelReceivedConfirmed
    );
    assert_eq!(harness.issues.script.calls("update_issue"), 1);
}

#[tokio::test]
async fn test_devolution_received_credits_the_payer() {
    let harness = Harness::new();
    let original = confirmed_payment(&harness).await;
    let id = Uuid::new_v4();

    let ready = receive_devolution(
        &harness.ctx,
        ReceiveDevolutionRequest {
            id,
            amount: 4_000,
            end_to_end_id: "D-E2E-1".to_string(),
            original_end_to_end_id: original,
            third_part: None,
            reason: Some("partial return".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(topics(&ready), vec!["DEVOLUTION_RECEIVED.READY"]);

    let credited = handle_ready_devolution_received(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&credited), vec!["DEVOLUTION_RECEIVED.RECEIVED"]);
    let devolution = credited.entity().unwrap();
    assert_eq!(devolution.state, PixDevolutionReceivedState::Received);
    assert_eq!(devolution.operation.as_ref().map(|op| op.value), Some(4_000));
}

#[tokio::test]
async fn test_devolution_received_cannot_exceed_the_payment() {
    let harness = Harness::new();
    let original = confirmed_payment(&harness).await;

    let result = receive_devolution(
        &harness.ctx,
        ReceiveDevolutionRequest {
            id: Uuid::new_v4(),
            amount: 10_001,
            end_to_end_id: "D-E2E-2".to_string(),
            original_end_to_end_id: original,
            third_part: None,
            reason: None,
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(SagaError::Domain(DomainError::AmountExceeded {
            requested: 10_001,
            available: 10_000
        }))
    ));
}

#[tokio::test]
async fn test_devolution_received_credit_failure_ends_in_error() {
    let harness = Harness::new();
    let original = confirmed_payment(&harness).await;
    let id = Uuid::new_v4();
    receive_devolution(
        &harness.ctx,
        ReceiveDevolutionRequest {
            id,
            amount: 1_000,
            end_to_end_id: "D-E2E-3".to_string(),
            original_end_to_end_id: original,
            third_part: None,
            reason: None,
        },
    )
    .await
    .unwrap();

    harness.ledger.script.fail("create_operation", unavailable());
    let failed = handle_ready_devolution_received(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&failed), vec!["DEVOLUTION_RECEIVED.FAILED"]);

    let errored = handle_failed_devolution_received(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&errored), vec!["DEVOLUTION_RECEIVED.ERROR"]);
    assert_eq!(
        errored.entity().unwrap().state,
        PixDevolutionReceivedState::Error
    );
}
