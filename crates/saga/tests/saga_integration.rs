//! Integration tests for the checkout saga.
//!
//! Everything runs against the in-memory store, gateway and email provider.

use std::time::Duration;

use chrono::Utc;
use common::{CartId, UserId};
use domain::{DomainError, FinalizeOrder, LineItem, PricingConfig, PromoDiscount};
use order_store::{
    EmailKind, EmailStatus, InMemoryOrderStore, NewAbandonedCart, NotificationStatus, OrderStore,
    Profile, RecoveryStatus,
};
use saga::checkout::{STEP_LINK_CAPTURE, STEP_NOTIFY, STEP_RECOVER_CART};
use saga::{
    AdminOutcome, CheckoutRequest, CheckoutSaga, FailureFamily, InMemoryEmailProvider,
    InMemoryPaymentGateway, NotificationError, NotificationSettings, PaymentError, RetryPolicy,
    SagaError, StepStatus,
};
use serde_json::json;

type TestSaga = CheckoutSaga<InMemoryOrderStore, InMemoryPaymentGateway, InMemoryEmailProvider>;

const PAYER: &str = "payer@banners.test";

struct TestHarness {
    saga: TestSaga,
    store: InMemoryOrderStore,
    gateway: InMemoryPaymentGateway,
    email: InMemoryEmailProvider,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryOrderStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let email = InMemoryEmailProvider::new();

        let saga = CheckoutSaga::new(
            store.clone(),
            gateway.clone(),
            email.clone(),
            PricingConfig::default(),
            NotificationSettings::default(),
        )
        .with_retry_policy(RetryPolicy::immediate());

        Self {
            saga,
            store,
            gateway,
            email,
        }
    }

    /// Two banners totalling $33.33, which price to $33.56 with tier and tax.
    fn cart() -> FinalizeOrder {
        FinalizeOrder::new(vec![LineItem::new(1500, 1, 1500), LineItem::new(1833, 1, 1833)])
    }

    fn request(gateway_order_id: &str) -> CheckoutRequest {
        CheckoutRequest {
            gateway_order_id: gateway_order_id.to_string(),
            idempotency_key: None,
            order: Self::cart(),
        }
    }

    async fn abandon_cart(&self, email: &str) -> CartId {
        let id = CartId::new();
        self.store
            .insert_abandoned_cart(NewAbandonedCart {
                id,
                user_id: None,
                email: Some(email.to_string()),
                cart_contents: json!([{"product_type": "banner"}]),
                total_value_cents: 3333,
                recovery_status: RecoveryStatus::Abandoned,
                last_activity_at: Utc::now(),
            })
            .await;
        id
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn happy_path_captures_persists_and_follows_up() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        let cart_id = h.abandon_cart(PAYER).await;

        let outcome = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();

        assert_eq!(outcome.capture.capture_id, "CAP-000001");
        assert_eq!(outcome.capture.amount_cents, Some(3356));
        assert!(outcome.order.created);
        assert_eq!(outcome.order.order.email, PAYER);
        assert_eq!(outcome.order.order.customer_name.as_deref(), Some("Test Buyer"));
        assert_eq!(
            outcome.order.order.gateway_capture_id.as_deref(),
            Some("CAP-000001")
        );
        assert_eq!(outcome.order.order.totals.total_cents, 3356);
        assert_eq!(outcome.steps.len(), 3);
        assert!(outcome.steps.iter().all(|s| s.status == StepStatus::Completed));

        let steps = h.saga.follow_up(&outcome.order.order).await;
        assert_eq!(steps[0].step, STEP_RECOVER_CART);
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].step, STEP_NOTIFY);
        assert_eq!(steps[1].status, StepStatus::Completed);

        let cart = h.store.get_cart(cart_id).await.unwrap();
        assert_eq!(cart.recovery_status, RecoveryStatus::Recovered);
        assert_eq!(cart.recovered_order_id, Some(outcome.order.order_id()));

        let sent = h.email.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, PAYER);
        assert!(sent[0].subject.starts_with("Order Confirmation #"));
        assert!(sent[1].subject.ends_with("- $33.56"));

        let order = h
            .store
            .get_order(outcome.order.order_id())
            .await
            .unwrap()
            .unwrap();
        assert!(order.confirmation_sent());
        assert!(order.admin_notified());
    }

    #[tokio::test]
    async fn request_email_wins_over_payer_email() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;

        let mut request = TestHarness::request("PP-1");
        request.order = request.order.with_email("typed@banners.test");
        let outcome = h.saga.checkout(request).await.unwrap();

        assert_eq!(outcome.order.order.email, "typed@banners.test");
    }

    #[tokio::test]
    async fn known_user_keeps_profile_email() {
        let h = TestHarness::new();
        let user_id = UserId::new();
        h.store
            .insert_profile(Profile {
                id: user_id,
                email: "member@banners.test".to_string(),
                username: Some("member".to_string()),
            })
            .await;
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;

        let mut request = TestHarness::request("PP-1");
        request.order = request.order.for_user(user_id);
        let outcome = h.saga.checkout(request).await.unwrap();

        assert_eq!(outcome.order.order.user_id, Some(user_id));
        assert_eq!(outcome.order.order.email, "member@banners.test");
    }

    #[tokio::test]
    async fn replayed_checkout_converges_on_one_order() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;

        let first = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();
        h.saga.follow_up(&first.order.order).await;
        let events_after_first = h.store.email_event_count().await;

        let second = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();
        assert!(!second.order.created);
        assert_eq!(second.order.order_id(), first.order.order_id());
        assert_eq!(second.capture.capture_id, first.capture.capture_id);
        assert_eq!(h.gateway.capture_count().await, 1);
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.store.item_count().await, 2);

        let steps = h.saga.follow_up(&second.order.order).await;
        assert_eq!(steps[0].status, StepStatus::Skipped);
        assert_eq!(steps[1].status, StepStatus::Skipped);
        assert_eq!(h.store.email_event_count().await, events_after_first);
        assert_eq!(h.email.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn amount_mismatch_writes_nothing() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3000, Some(PAYER)).await;

        let err = h
            .saga
            .checkout(TestHarness::request("PP-1"))
            .await
            .unwrap_err();

        match &err {
            SagaError::AmountMismatch {
                expected,
                captured,
                capture,
            } => {
                assert_eq!(*expected, 3356);
                assert_eq!(*captured, Some(3000));
                assert_eq!(capture.capture_id, "CAP-000001");
            }
            other => panic!("expected amount mismatch, got {other:?}"),
        }
        assert_eq!(err.code(), "AMOUNT_MISMATCH");
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn unresolvable_identity_is_a_domain_error() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, None).await;

        let err = h
            .saga
            .checkout(TestHarness::request("PP-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SagaError::Domain(DomainError::IdentityResolution(_))
        ));
        assert_eq!(h.store.order_count().await, 0);
    }
}

mod capture_failures {
    use super::*;

    #[tokio::test]
    async fn declined_instrument_is_malformed_request() {
        let h = TestHarness::new();
        h.gateway
            .script_reply(
                422,
                json!({
                    "name": "UNPROCESSABLE_ENTITY",
                    "details": [{"issue": "INSTRUMENT_DECLINED"}],
                }),
            )
            .await;

        let err = h
            .saga
            .checkout(TestHarness::request("PP-1"))
            .await
            .unwrap_err();

        match &err {
            SagaError::Payment(PaymentError::CaptureFailed { status, family, .. }) => {
                assert_eq!(*status, 422);
                assert_eq!(*family, FailureFamily::MalformedRequest);
            }
            other => panic!("expected capture failure, got {other:?}"),
        }
        assert_eq!(err.code(), "PAYPAL_CAPTURE_FAILED");
        assert!(err.hint().is_some());
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn internal_error_on_success_status_is_a_failure() {
        let h = TestHarness::new();
        h.gateway
            .script_reply(200, json!({"name": "INTERNAL_SERVER_ERROR"}))
            .await;

        let err = h.saga.capture_only("PP-1", None).await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::Payment(PaymentError::CaptureFailed {
                status: 502,
                family: FailureFamily::Transient,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn token_failure_is_reported() {
        let h = TestHarness::new();
        h.gateway.set_fail_on_token(true);

        let err = h.saga.capture_only("PP-1", None).await.unwrap_err();
        assert_eq!(err.code(), "PAYPAL_TOKEN_ERROR");
    }

    #[tokio::test]
    async fn blank_gateway_order_is_rejected_before_calling() {
        let h = TestHarness::new();

        let err = h.saga.capture_only("  ", None).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_ORDER_ID");
        assert_eq!(h.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn explicit_idempotency_key_is_forwarded() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;

        let first = h.saga.capture_only("PP-1", Some("retry-key")).await.unwrap();
        let again = h.saga.capture_only("PP-1", Some("retry-key")).await.unwrap();

        assert_eq!(first.idempotency_key, "retry-key");
        assert_eq!(first.capture_id, again.capture_id);
        assert_eq!(h.gateway.call_count(), 2);
        assert_eq!(h.gateway.capture_count().await, 1);
    }
}

mod capture_linking {
    use super::*;

    #[tokio::test]
    async fn links_capture_onto_existing_order() {
        let h = TestHarness::new();
        let finalized = h
            .saga
            .orders()
            .finalize(TestHarness::cart().with_email(PAYER))
            .await
            .unwrap();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;

        let outcome = h
            .saga
            .capture_and_link("PP-1", None, finalized.order_id())
            .await
            .unwrap();

        assert_eq!(outcome.steps[1].step, STEP_LINK_CAPTURE);
        assert_eq!(outcome.steps[1].status, StepStatus::Completed);
        let order = h
            .store
            .get_order(finalized.order_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.gateway_capture_id.as_deref(), Some("CAP-000001"));
        assert_eq!(order.gateway_order_id.as_deref(), Some("PP-1"));
    }

    #[tokio::test]
    async fn link_failure_keeps_the_capture() {
        let h = TestHarness::new();
        let finalized = h
            .saga
            .orders()
            .finalize(TestHarness::cart().with_email(PAYER))
            .await
            .unwrap();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        h.store.set_fail_on_link_capture(true);

        let outcome = h
            .saga
            .capture_and_link("PP-1", None, finalized.order_id())
            .await
            .unwrap();

        assert_eq!(outcome.capture.capture_id, "CAP-000001");
        assert_eq!(outcome.steps[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn second_capture_never_replaces_the_first() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        let checkout = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();
        let order_id = checkout.order.order_id();
        h.gateway.approve("PP-2", 3356, Some(PAYER)).await;

        let outcome = h.saga.capture_and_link("PP-2", None, order_id).await.unwrap();

        assert_eq!(outcome.capture.capture_id, "CAP-000002");
        assert_eq!(outcome.steps[1].status, StepStatus::Failed);
        let order = h.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.gateway_capture_id.as_deref(), Some("CAP-000001"));
        assert_eq!(order.gateway_order_id.as_deref(), Some("PP-1"));
        assert_eq!(
            h.store
                .find_order_by_capture("CAP-000001")
                .await
                .unwrap()
                .map(|o| o.id),
            Some(order_id)
        );
    }
}

mod payment_orders {
    use super::*;

    #[tokio::test]
    async fn opens_gateway_order_for_server_total() {
        let h = TestHarness::new();

        let opened = h.saga.open_payment(&TestHarness::cart()).await.unwrap();

        assert_eq!(opened.pricing.total_cents, 3356);
        assert_eq!(opened.status, "CREATED");
        assert_eq!(
            h.gateway.approved_amount(&opened.gateway_order_id).await,
            Some(3356)
        );

        let outcome = h
            .saga
            .checkout(CheckoutRequest {
                gateway_order_id: opened.gateway_order_id.clone(),
                idempotency_key: None,
                order: TestHarness::cart().with_email(PAYER),
            })
            .await
            .unwrap();
        assert_eq!(outcome.capture.amount_cents, Some(3356));
        assert!(outcome.order.created);
    }

    #[tokio::test]
    async fn promo_is_priced_before_opening() {
        let h = TestHarness::new();
        let mut cart = TestHarness::cart();
        cart.promo = Some(PromoDiscount::fixed("SAVE10", 1000));

        let opened = h.saga.open_payment(&cart).await.unwrap();

        assert_eq!(opened.pricing.discount_cents, 1000);
        assert_eq!(
            h.gateway.approved_amount(&opened.gateway_order_id).await,
            Some(opened.pricing.total_cents)
        );
    }

    #[tokio::test]
    async fn empty_cart_opens_nothing() {
        let h = TestHarness::new();

        let err = h
            .saga
            .open_payment(&FinalizeOrder::new(Vec::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::Domain(DomainError::Validation(_))));
        assert_eq!(h.gateway.approved_amount("PP-ORDER-000001").await, None);
    }

    #[tokio::test]
    async fn token_failure_is_reported() {
        let h = TestHarness::new();
        h.gateway.set_fail_on_token(true);

        let err = h.saga.open_payment(&TestHarness::cart()).await.unwrap_err();

        assert_eq!(err.code(), "PAYPAL_TOKEN_ERROR");
        assert!(matches!(
            err,
            SagaError::Payment(PaymentError::Token { status: 401, .. })
        ));
    }
}

mod notifications {
    use super::*;

    async fn persisted_order(h: &TestHarness) -> order_store::OrderRecord {
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        h.saga
            .checkout(TestHarness::request("PP-1"))
            .await
            .unwrap()
            .order
            .order
    }

    #[tokio::test]
    async fn transient_failures_stop_at_three_attempts() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.email.fail_next([500, 503, 429]).await;

        let err = h.saga.notifications().notify(order.id).await.unwrap_err();
        assert!(matches!(
            err,
            NotificationError::ProviderFailed { attempts: 3, .. }
        ));
        assert_eq!(h.email.attempts().await, 3);

        let events = h.store.email_events_for_order(order.id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.status == EmailStatus::Error));
        assert_eq!(
            events.iter().map(|e| e.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert!(!stored.confirmation_sent());
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.email.fail_next([503]).await;

        let outcome = h.saga.notifications().notify(order.id).await.unwrap();
        assert!(outcome.ok);
        assert!(!outcome.idempotent);

        let events = h.store.email_events_for_order(order.id).await.unwrap();
        let confirmation: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EmailKind::OrderConfirmation)
            .collect();
        assert_eq!(confirmation.len(), 2);
        assert_eq!(confirmation[0].status, EmailStatus::Error);
        assert_eq!(confirmation[1].status, EmailStatus::Sent);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.email.fail_next([422]).await;

        let err = h.saga.notifications().notify(order.id).await.unwrap_err();
        assert!(matches!(
            err,
            NotificationError::ProviderFailed { attempts: 1, .. }
        ));
        assert_eq!(h.email.attempts().await, 1);
    }

    #[tokio::test]
    async fn admin_failure_does_not_undo_confirmation() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.email
            .fail_recipient(NotificationSettings::default().admin_email, 500)
            .await;

        let outcome = h.saga.notifications().notify(order.id).await.unwrap();
        assert!(outcome.ok);
        assert!(matches!(outcome.admin, AdminOutcome::Failed { .. }));

        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert!(stored.confirmation_sent());
        assert!(!stored.admin_notified());
    }

    #[tokio::test]
    async fn second_notify_is_idempotent() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;

        h.saga.notifications().notify(order.id).await.unwrap();
        let events = h.store.email_event_count().await;

        let again = h.saga.notifications().notify(order.id).await.unwrap();
        assert!(again.idempotent);
        assert_eq!(again.admin, AdminOutcome::Skipped);
        assert_eq!(h.store.email_event_count().await, events);
    }

    #[tokio::test]
    async fn concurrent_notifies_send_one_confirmation() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.email.set_send_delay(Duration::from_millis(50)).await;

        let dispatcher = h.saga.notifications();
        let (a, b) = tokio::join!(dispatcher.notify(order.id), dispatcher.notify(order.id));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.ok && b.ok);
        assert_ne!(a.idempotent, b.idempotent);

        let events = h.store.email_events_for_order(order.id).await.unwrap();
        let confirmations = events
            .iter()
            .filter(|e| e.kind == EmailKind::OrderConfirmation)
            .count();
        let admin = events
            .iter()
            .filter(|e| e.kind == EmailKind::AdminNotification)
            .count();
        assert_eq!(confirmations, 1);
        assert_eq!(admin, 1);
        assert_eq!(h.email.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_send_releases_the_claim() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.email.fail_next([422]).await;

        assert!(h.saga.notifications().notify(order.id).await.is_err());
        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.confirmation_email_status, NotificationStatus::Unsent);

        let retried = h.saga.notifications().notify(order.id).await.unwrap();
        assert!(!retried.idempotent);
        assert!(retried.message_id.is_some());
    }

    #[tokio::test]
    async fn lost_status_write_does_not_resend() {
        let h = TestHarness::new();
        let order = persisted_order(&h).await;
        h.store.set_fail_on_mark_confirmation(true);

        let first = h.saga.notifications().notify(order.id).await.unwrap();
        assert!(!first.idempotent);

        let second = h.saga.notifications().notify(order.id).await.unwrap();
        assert!(second.idempotent);

        let confirmations = h
            .email
            .sent()
            .await
            .into_iter()
            .filter(|e| e.to == PAYER)
            .count();
        assert_eq!(confirmations, 1);
        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.confirmation_email_status, NotificationStatus::Sending);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let h = TestHarness::new();
        let err = h
            .saga
            .notifications()
            .notify(common::OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::OrderNotFound(_)));
    }
}

mod best_effort_isolation {
    use super::*;

    #[tokio::test]
    async fn cart_lookup_failure_does_not_block_notification() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        let outcome = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();
        h.store.set_fail_on_cart_lookup(true);

        let steps = h.saga.follow_up(&outcome.order.order).await;

        assert_eq!(steps[0].status, StepStatus::Failed);
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn notification_failure_keeps_the_order() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        let outcome = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();
        h.email.fail_next([500, 500, 500]).await;

        let steps = h.saga.follow_up(&outcome.order.order).await;

        assert_eq!(steps[1].status, StepStatus::Failed);
        assert!(steps[1].detail.as_deref().unwrap_or_default().contains("3 attempt"));
        assert!(
            h.store
                .get_order(outcome.order.order_id())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn no_cart_is_skipped() {
        let h = TestHarness::new();
        h.gateway.approve("PP-1", 3356, Some(PAYER)).await;
        let outcome = h.saga.checkout(TestHarness::request("PP-1")).await.unwrap();

        let steps = h.saga.follow_up(&outcome.order.order).await;
        assert_eq!(steps[0].status, StepStatus::Skipped);
    }
}
