use mockito::{Matcher, Server};
use serde_json::json;
use uuid::Uuid;

use pix_saga_core::adapters::{
    HttpGatewayClient, HttpOperationService, HttpPixGateway, HttpSmsGateway, HttpUserService,
};
use pix_saga_core::error::GatewayError;
use pix_saga_core::ports::{
    OperationRequest, OperationService, PixPaymentGateway, SmsGateway, SmsMessage, TransferKind,
    TransferOrder, TransferStatus, UserService,
};

fn transfer_order() -> TransferOrder {
    TransferOrder {
        id: Uuid::new_v4(),
        kind: TransferKind::Payment,
        amount: 1_500,
        description: None,
        beneficiary: None,
        original_end_to_end_id: None,
    }
}

#[tokio::test]
async fn test_send_transfer_posts_order_and_reads_receipt() {
    let mut server = Server::new_async().await;
    let order = transfer_order();
    let mock = server
        .mock("POST", "/transfers")
        .match_body(Matcher::PartialJson(json!({ "amount": 1500, "kind": "PAYMENT" })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"externalId":"psp-1","endToEndId":"E0001"}"#)
        .create_async()
        .await;
    let pix = HttpPixGateway::new(HttpGatewayClient::new(server.url()));

    let receipt = pix.send_transfer(&order).await.unwrap();

    mock.assert_async().await;
    assert_eq!(receipt.external_id, "psp-1");
    assert_eq!(receipt.end_to_end_id.as_deref(), Some("E0001"));
}

#[tokio::test]
async fn test_get_transfer_decodes_tagged_status() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/transfers/psp-1")
        .with_status(200)
        .with_body(r#"{"status":"COMPLETED","endToEndId":"E0001"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/transfers/psp-2")
        .with_status(200)
        .with_body(r#"{"status":"FAILED","code":"AB09","message":"rejected"}"#)
        .create_async()
        .await;
    let pix = HttpPixGateway::new(HttpGatewayClient::new(server.url()));

    assert_eq!(
        pix.get_transfer("psp-1").await.unwrap(),
        TransferStatus::Completed {
            end_to_end_id: Some("E0001".to_string())
        }
    );
    assert!(matches!(
        pix.get_transfer("psp-2").await.unwrap(),
        TransferStatus::Failed { code, .. } if code == "AB09"
    ));
}

#[tokio::test]
async fn test_ledger_rejection_carries_provider_code() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/operations")
        .with_status(422)
        .with_body(r#"{"code":"INSUFFICIENT_BALANCE","message":"not enough funds"}"#)
        .create_async()
        .await;
    let ledger = HttpOperationService::new(HttpGatewayClient::new(server.url()));
    let request = OperationRequest {
        id: Uuid::new_v4(),
        tag: "PIXSEND".to_string(),
        owner_id: Uuid::new_v4(),
        value: 1_000,
        description: "Pix payment".to_string(),
    };

    let error = ledger.create_operation(&request).await.unwrap_err();

    match error {
        GatewayError::Rejected { code, message } => {
            assert_eq!(code, "INSUFFICIENT_BALANCE");
            assert_eq!(message, "not enough funds");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_accept_operation_accepts_empty_body() {
    let mut server = Server::new_async().await;
    let operation_id = Uuid::new_v4();
    let mock = server
        .mock("POST", format!("/operations/{operation_id}/accept").as_str())
        .with_status(204)
        .create_async()
        .await;
    let ledger = HttpOperationService::new(HttpGatewayClient::new(server.url()));

    ledger.accept_operation(operation_id).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_income_is_none() {
    let mut server = Server::new_async().await;
    let known = Uuid::new_v4();
    let unknown = Uuid::new_v4();
    server
        .mock("GET", format!("/users/{known}/income").as_str())
        .with_status(200)
        .with_body(r#"{"monthlyIncome":350000}"#)
        .create_async()
        .await;
    server
        .mock("GET", format!("/users/{unknown}/income").as_str())
        .with_status(404)
        .create_async()
        .await;
    let users = HttpUserService::new(HttpGatewayClient::new(server.url()));

    assert_eq!(users.get_monthly_income(known).await.unwrap(), Some(350_000));
    assert_eq!(users.get_monthly_income(unknown).await.unwrap(), None);
}

#[tokio::test]
async fn test_circuit_opens_after_consecutive_outages() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/messages")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let client = HttpGatewayClient::with_circuit_breaker(server.url(), 2, 60);
    let carrier = HttpSmsGateway::new(client.clone());
    let message = SmsMessage {
        id: Uuid::new_v4(),
        phone_number: "+5511999990000".to_string(),
        body: "hello".to_string(),
    };

    for _ in 0..2 {
        let error = carrier.send_sms(&message).await.unwrap_err();
        assert!(matches!(error, GatewayError::Unavailable(_)));
    }
    assert_eq!(client.circuit_state(), "open");

    let error = carrier.send_sms(&message).await.unwrap_err();
    assert!(matches!(error, GatewayError::CircuitOpen(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_custom_breaker_starts_closed() {
    let client = HttpGatewayClient::with_circuit_breaker("http://127.0.0.1:9".to_string(), 5, 30);

    assert_eq!(client.circuit_state(), "closed");
    assert_eq!(client.base_url(), "http://127.0.0.1:9");
}
