mod common;

use uuid::Uuid;

use common::{topics, unavailable, Harness};
use pix_saga_core::domain::{NotificationState, SagaEntity};
use pix_saga_core::notify::email::{create_email, handle_pending_email, CreateEmailRequest};
use pix_saga_core::notify::sms::{create_sms, handle_send_sms, requeue_stuck_sms, CreateSmsRequest};
use pix_saga_core::ports::EntityRepository;

fn sms_request(phone_number: &str, token: Option<&str>) -> CreateSmsRequest {
    CreateSmsRequest {
        id: Uuid::new_v4(),
        user_id: Some(Uuid::new_v4()),
        phone_number: phone_number.to_string(),
        body: "Your code is 123456".to_string(),
        idempotency_token: token.map(str::to_string),
    }
}

fn email_request() -> CreateEmailRequest {
    CreateEmailRequest {
        id: Uuid::new_v4(),
        user_id: None,
        to: "maria@example.com".to_string(),
        from: "no-reply@example.com".to_string(),
        title: "Pix received".to_string(),
        body: "You received R$ 10,00".to_string(),
        html: false,
    }
}

#[tokio::test]
async fn test_sms_sharing_a_token_rotates_providers() {
    let harness = Harness::new();
    let mut first_providers = Vec::new();

    for _ in 0..4 {
        let created = create_sms(&harness.ctx, sms_request("+5511999990000", Some("otp-42")))
            .await
            .unwrap();
        let sms = created.entity().unwrap();
        first_providers.push(sms.current_provider().unwrap().to_string());
    }

    assert_eq!(first_providers, vec!["A", "B", "C", "A"]);
}

#[tokio::test]
async fn test_failover_does_not_shift_the_next_rotation_start() {
    let harness = Harness::new();
    let mut first_providers = Vec::new();

    for _ in 0..4 {
        let created = create_sms(&harness.ctx, sms_request("+5511999990000", Some("otp-77")))
            .await
            .unwrap();
        let sms = created.entity().unwrap();
        let start = sms.current_provider().unwrap().to_string();
        let id = sms.id;

        harness.sms_provider(&start).script.fail("send_sms", unavailable());
        let failover = handle_send_sms(&harness.ctx, id, &start).await.unwrap();
        harness.sms_provider(&start).script.heal("send_sms");

        let next = match start.as_str() {
            "A" => "B",
            "B" => "C",
            _ => "A",
        };
        assert_eq!(topics(&failover), vec![format!("SMS.SEND.{next}")]);
        let sent = handle_send_sms(&harness.ctx, id, next).await.unwrap();
        assert_eq!(topics(&sent), vec!["SMS.SENT"]);

        first_providers.push(start);
    }

    assert_eq!(first_providers, vec!["A", "B", "C", "A"]);
}

#[tokio::test]
async fn test_sms_without_token_starts_with_first_provider() {
    let harness = Harness::new();

    let created = create_sms(&harness.ctx, sms_request("+5511999990000", None))
        .await
        .unwrap();

    assert_eq!(topics(&created), vec!["SMS.SEND.A"]);
    assert_eq!(created.entity().unwrap().route, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_international_sms_uses_dedicated_provider() {
    let harness = Harness::new();

    let created = create_sms(&harness.ctx, sms_request("+14155550100", Some("otp-1")))
        .await
        .unwrap();

    assert_eq!(topics(&created), vec!["SMS.SEND.INTL"]);
    let id = created.entity().unwrap().id;
    handle_send_sms(&harness.ctx, id, "INTL").await.unwrap();
    assert_eq!(harness.sms_provider("INTL").delivered.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sms_fails_over_then_dead_letters() {
    let harness = Harness::new();
    for provider in ["A", "B", "C"] {
        harness.sms_provider(provider).script.fail("send_sms", unavailable());
    }
    let created = create_sms(&harness.ctx, sms_request("+5511999990000", None))
        .await
        .unwrap();
    let id = created.entity().unwrap().id;

    let first = handle_send_sms(&harness.ctx, id, "A").await.unwrap();
    assert_eq!(topics(&first), vec!["SMS.SEND.B"]);

    let second = handle_send_sms(&harness.ctx, id, "B").await.unwrap();
    assert_eq!(topics(&second), vec!["SMS.SEND.C"]);

    let last = handle_send_sms(&harness.ctx, id, "C").await.unwrap();
    assert_eq!(topics(&last), vec!["SMS.DEAD_LETTER"]);

    let sms = harness.ctx.repositories.sms.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(sms.state(), NotificationState::DeadLetter);
    assert_eq!(sms.failed.as_ref().map(|f| f.code.as_str()), Some("GATEWAY_UNAVAILABLE"));
}

#[tokio::test]
async fn test_sms_is_delivered_by_the_next_provider() {
    let harness = Harness::new();
    harness.sms_provider("A").script.fail("send_sms", unavailable());
    let created = create_sms(&harness.ctx, sms_request("+5511999990000", None))
        .await
        .unwrap();
    let id = created.entity().unwrap().id;

    handle_send_sms(&harness.ctx, id, "A").await.unwrap();
    let sent = handle_send_sms(&harness.ctx, id, "B").await.unwrap();

    assert_eq!(topics(&sent), vec!["SMS.SENT"]);
    assert_eq!(harness.sms_provider("B").delivered.lock().unwrap().len(), 1);
    assert!(sent.entity().unwrap().failed.is_none());
}

#[tokio::test]
async fn test_redelivered_sms_is_sent_once() {
    let harness = Harness::new();
    let created = create_sms(&harness.ctx, sms_request("+5511999990000", None))
        .await
        .unwrap();
    let id = created.entity().unwrap().id;

    handle_send_sms(&harness.ctx, id, "A").await.unwrap();
    let again = handle_send_sms(&harness.ctx, id, "A").await.unwrap();
    let wrong_provider = handle_send_sms(&harness.ctx, id, "B").await.unwrap();

    assert!(again.is_ignored());
    assert!(wrong_provider.is_ignored());
    assert_eq!(harness.sms_provider("A").script.calls("send_sms"), 1);
    assert_eq!(harness.sms_provider("B").script.calls("send_sms"), 0);
}

#[tokio::test]
async fn test_stuck_sms_is_requeued_to_its_provider() {
    let harness = Harness::new();
    let created = create_sms(&harness.ctx, sms_request("+5511999990000", None))
        .await
        .unwrap();
    let id = created.entity().unwrap().id;
    harness
        .ctx
        .repositories
        .sms
        .update_state_if(id, NotificationState::Pending, NotificationState::Processing)
        .await
        .unwrap();

    let requeued = requeue_stuck_sms(&harness.ctx, id).await.unwrap();

    assert_eq!(topics(&requeued), vec!["SMS.SEND.A"]);
    assert_eq!(requeued.entity().map(|s| s.state), Some(NotificationState::Pending));
}

#[tokio::test]
async fn test_email_retries_are_bounded() {
    let harness = Harness::new();
    harness.smtp.script.fail("send_email", unavailable());
    let created = create_email(&harness.ctx, email_request()).await.unwrap();
    assert_eq!(topics(&created), vec!["EMAIL.PENDING"]);
    let id = created.entity().unwrap().id;

    for attempt in 1..3 {
        let outcome = handle_pending_email(&harness.ctx, id).await.unwrap();
        assert!(outcome.events().is_empty(), "attempt {attempt} should stay pending");
        let email = harness.ctx.repositories.emails.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(email.state, NotificationState::Pending);
        assert_eq!(email.attempts, attempt);
    }

    let last = handle_pending_email(&harness.ctx, id).await.unwrap();
    assert_eq!(topics(&last), vec!["EMAIL.FAILED"]);
    let email = harness.ctx.repositories.emails.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(email.state, NotificationState::Failed);
    assert_eq!(email.attempts, 3);

    let after = handle_pending_email(&harness.ctx, id).await.unwrap();
    assert!(after.is_ignored());
    assert_eq!(harness.smtp.script.calls("send_email"), 3);
}

#[tokio::test]
async fn test_email_is_sent() {
    let harness = Harness::new();
    let created = create_email(&harness.ctx, email_request()).await.unwrap();
    let id = created.entity().unwrap().id;

    let sent = handle_pending_email(&harness.ctx, id).await.unwrap();

    assert_eq!(topics(&sent), vec!["EMAIL.SENT"]);
    assert_eq!(sent.entity().map(|e| e.attempts), Some(1));
}
