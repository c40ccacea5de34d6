mod common;

use std::sync::atomic::Ordering;

use abstract_portal::{
    db::{FailPoint, Store},
    dto::{CallbackQuery, ConfirmPaymentDto, InitiatePaymentDto, ReviewAbstractDto},
    errors::AppError,
    models::{AbstractStatus, PaymentStatus},
    service::{abstracts, payment},
};
use common::TestEnv;

fn confirm_id(payment_id: i64) -> ConfirmPaymentDto {
    ConfirmPaymentDto {
        payment_id: Some(payment_id),
        tx_ref: None,
    }
}

#[tokio::test]
async fn initiate_for_missing_abstract_creates_nothing() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;

    let err = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: 42 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(env.store.payments_for_author(author.user_id).await.unwrap().is_empty());
    assert!(env.store.invoices_for_abstract(42).await.unwrap().is_empty());
    assert!(env.gateway.checkouts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn initiate_requires_the_author() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let other = env.student("bob@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;

    let err = payment::initiate(env.app_state(), &other, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
    assert!(env.store.payments_for_abstract(target.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn gateway_failure_persists_nothing() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    env.gateway.refuse_checkout.store(true, Ordering::SeqCst);

    let err = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gateway { .. }));
    assert!(env.store.payments_for_abstract(target.id).await.unwrap().is_empty());
    assert!(env.store.invoices_for_abstract(target.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn initiate_records_linked_invoice_and_payment() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;

    let opened = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap();
    assert!(opened.tx_ref.starts_with(&format!("ABS-{}-", target.id)));
    assert_eq!(opened.amount, 1.99);
    assert_eq!(opened.currency, "USD");
    assert_eq!(opened.checkout_url, format!("https://checkout.test/{}", opened.tx_ref));

    let sent = env.gateway.checkouts.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].callback_url, "http://api.test/api/payments/callback");
    assert_eq!(sent[0].return_url, "http://portal.test/dashboard");
    assert_eq!(sent[0].email, "ann@uni.test");

    let payments = env.store.payments_for_abstract(target.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    let invoices = env.store.invoices_for_abstract(target.id).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].payment_id, Some(opened.payment_id));
    assert!(!invoices[0].paid);
}

#[tokio::test]
async fn initiate_refuses_rejected_abstracts() {
    let env = TestEnv::new();
    let admin = env.admin().await;
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    abstracts::review(
        env.app_state(),
        &admin,
        target.id,
        ReviewAbstractDto {
            action: "reject".into(),
            feedback: None,
            admin_id: None,
        },
    )
    .await
    .unwrap();

    let err = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
}

#[tokio::test]
async fn confirmation_publishes_and_is_idempotent() {
    let mut env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    let opened = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap();

    let first = payment::confirm(env.app_state(), confirm_id(opened.payment_id)).await.unwrap();
    assert!(!first.already_confirmed);
    assert_eq!(first.payment.status, PaymentStatus::Confirmed);
    assert!(first.payment.payment_date.is_some());
    assert_eq!(first.abstract_.status, AbstractStatus::Published);
    let invoice = first.invoice.clone().unwrap();
    assert!(invoice.paid);
    assert!(invoice.paid_at.is_some());

    let second = payment::confirm(env.app_state(), confirm_id(opened.payment_id)).await.unwrap();
    assert!(second.already_confirmed);
    assert_eq!(second.abstract_.status, AbstractStatus::Published);
    assert!(second.invoice.unwrap().paid);
    assert_eq!(second.payment.payment_date, first.payment.payment_date);

    let receipts: Vec<_> = env
        .drain_mail()
        .into_iter()
        .filter(|m| m.subject.starts_with("Payment Confirmation"))
        .collect();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].text.contains(&format!("Invoice ID: {}", invoice.id)));
    assert_eq!(env.store.notifications_for(author.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failure_partway_through_confirmation_changes_nothing() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    let opened = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap();

    for point in [FailPoint::InvoiceUpdate, FailPoint::AbstractUpdate, FailPoint::NotificationInsert] {
        env.store.fail_at(point);
        let err = payment::confirm(env.app_state(), confirm_id(opened.payment_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database { .. }));
        env.store.clear_fail_points();

        let stored = env.store.payment_by_id(opened.payment_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.payment_date.is_none());
        let invoices = env.store.invoices_for_abstract(target.id).await.unwrap();
        assert!(!invoices[0].paid);
        let current = env.store.abstract_by_id(target.id).await.unwrap().unwrap();
        assert_eq!(current.status, AbstractStatus::Pending);
        assert!(env.store.notifications_for(author.user_id).await.unwrap().is_empty());
    }

    let done = payment::confirm(env.app_state(), confirm_id(opened.payment_id)).await.unwrap();
    assert_eq!(done.abstract_.status, AbstractStatus::Published);
}

#[tokio::test]
async fn confirmation_by_transaction_reference() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    let opened = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap();

    let confirmed = payment::confirm(
        env.app_state(),
        ConfirmPaymentDto {
            payment_id: None,
            tx_ref: Some(opened.tx_ref.clone()),
        },
    )
    .await
    .unwrap();
    assert_eq!(confirmed.payment.id, opened.payment_id);

    let err = payment::confirm(
        env.app_state(),
        ConfirmPaymentDto {
            payment_id: None,
            tx_ref: Some("ABS-0-0".into()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let err = payment::confirm(env.app_state(), ConfirmPaymentDto::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn confirming_for_a_rejected_abstract_rolls_back() {
    let env = TestEnv::new();
    let admin = env.admin().await;
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    let opened = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap();
    abstracts::review(
        env.app_state(),
        &admin,
        target.id,
        ReviewAbstractDto {
            action: "reject".into(),
            feedback: Some("out of scope".into()),
            admin_id: Some(admin.user_id),
        },
    )
    .await
    .unwrap();

    let err = payment::confirm(env.app_state(), confirm_id(opened.payment_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
    let stored = env.store.payment_by_id(opened.payment_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn callback_settles_only_verified_successes() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    let opened = payment::initiate(env.app_state(), &author, InitiatePaymentDto { abstract_id: target.id })
        .await
        .unwrap();

    let failed = payment::callback(
        env.app_state(),
        CallbackQuery {
            tx_ref: Some(opened.tx_ref.clone()),
            status: Some("failed".into()),
        },
    )
    .await
    .unwrap();
    assert!(!failed.confirmed);

    let unverified = payment::callback(
        env.app_state(),
        CallbackQuery {
            tx_ref: Some(opened.tx_ref.clone()),
            status: Some("success".into()),
        },
    )
    .await
    .unwrap();
    assert!(!unverified.confirmed);
    let stored = env.store.payment_by_id(opened.payment_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);

    env.gateway.verified.store(true, Ordering::SeqCst);
    let settled = payment::callback(
        env.app_state(),
        CallbackQuery {
            tx_ref: Some(opened.tx_ref.clone()),
            status: Some("success".into()),
        },
    )
    .await
    .unwrap();
    assert!(settled.confirmed);
    let current = env.store.abstract_by_id(target.id).await.unwrap().unwrap();
    assert_eq!(current.status, AbstractStatus::Published);
}
