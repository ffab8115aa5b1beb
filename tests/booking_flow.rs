mod common;

use std::sync::atomic::Ordering;

use common::{
    booking_request, checkout_signature, create_product, create_user, database_url, date, setup,
    webhook_signature,
};
use rental_api::{
    domain::booking::{BookingStatus, PaymentStatus},
    dto::bookings::{ConfirmPaymentRequest, UpdateBookingRequest},
    entity::bookings::{Column as BookingCol, Entity as Bookings},
    error::AppError,
    middleware::auth::AuthUser,
    models::Booking,
    notifications::NotificationKind,
    services::booking_service::{self, WebhookOutcome},
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn confirmation(booking: &Booking, payment_id: &str, signature: String) -> ConfirmPaymentRequest {
    ConfirmPaymentRequest {
        razorpay_payment_id: Some(payment_id.into()),
        razorpay_order_id: booking.payment_id.clone(),
        razorpay_signature: Some(signature),
        booking_id: Some(booking.id),
    }
}

fn signed_confirmation(booking: &Booking, payment_id: &str) -> ConfirmPaymentRequest {
    let order_id = booking.payment_id.clone().expect("order id");
    confirmation(booking, payment_id, checkout_signature("test_secret", &order_id, payment_id))
}

#[tokio::test]
async fn create_prices_by_day_and_opens_a_payment_order() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 150).await?;

    let resp = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-03-01", "2026-03-03"),
    )
    .await?;

    let booking = resp.data.expect("booking");
    let order = resp.order.expect("order");
    assert_eq!(booking.total_price, 300);
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Pending);
    assert_eq!(booking.start_date, date(2026, 3, 1));
    assert_eq!(booking.payment_id.as_deref(), Some(order.id.as_str()));
    assert_eq!(order.amount, 30000);

    let requests = h.gateway.requests.lock().unwrap().clone();
    let sent = requests.last().expect("gateway called");
    assert_eq!(sent.receipt, format!("booking_{}", booking.id));
    assert_eq!(sent.notes.booking_id, booking.id.to_string());

    assert_eq!(h.sink.settle(booking.id, NotificationKind::Created, 1).await, 1);
    Ok(())
}

#[tokio::test]
async fn overlapping_dates_conflict_but_touching_dates_do_not() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let other = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-03-01", "2026-03-05"),
    )
    .await?;

    let same = booking_service::create_booking(
        &h.state,
        &other,
        booking_request(product_id, "2026-03-01", "2026-03-05"),
    )
    .await;
    assert!(matches!(same, Err(AppError::Conflict(_))));

    let inside = booking_service::create_booking(
        &h.state,
        &other,
        booking_request(product_id, "2026-03-02", "2026-03-03"),
    )
    .await;
    assert!(matches!(inside, Err(AppError::Conflict(_))));

    let touching = booking_service::create_booking(
        &h.state,
        &other,
        booking_request(product_id, "2026-03-05", "2026-03-07"),
    )
    .await?;
    assert_eq!(touching.data.expect("booking").total_price, 200);
    Ok(())
}

#[tokio::test]
async fn cancelled_bookings_release_their_dates() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let first = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-04-01", "2026-04-04"),
    )
    .await?
    .data
    .expect("booking");

    let cancelled = booking_service::cancel_booking(&h.state, &renter, first.id).await?;
    assert_eq!(cancelled.data.expect("booking").status, BookingStatus::Cancelled);

    let again = booking_service::cancel_booking(&h.state, &renter, first.id).await?;
    assert_eq!(again.message.as_deref(), Some("Booking already cancelled"));
    assert_eq!(h.sink.settle(first.id, NotificationKind::Cancelled, 1).await, 1);

    booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-04-01", "2026-04-04"),
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn confirmation_is_verified_and_idempotent() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-05-01", "2026-05-03"),
    )
    .await?
    .data
    .expect("booking");

    let tampered = confirmation(&booking, "pay_1", "0".repeat(64));
    let err = booking_service::confirm_payment(&h.state, &renter, tampered)
        .await
        .expect_err("bad signature");
    assert!(matches!(err, AppError::PaymentVerification(_)));

    let stored = Bookings::find_by_id(booking.id).one(&h.state.orm).await?.expect("row");
    assert_eq!(stored.status, "pending");
    assert_eq!(stored.payment_status, "pending");

    let confirmed = booking_service::confirm_payment(
        &h.state,
        &renter,
        signed_confirmation(&booking, "pay_1"),
    )
    .await?
    .data
    .expect("booking");
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Completed);

    let repeat = booking_service::confirm_payment(
        &h.state,
        &renter,
        signed_confirmation(&booking, "pay_1"),
    )
    .await?;
    assert_eq!(repeat.message.as_deref(), Some("Payment already confirmed"));
    assert_eq!(h.sink.settle(booking.id, NotificationKind::Confirmed, 1).await, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_confirmations_notify_once() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-05-10", "2026-05-12"),
    )
    .await?
    .data
    .expect("booking");

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let state = h.state.clone();
        let renter = renter.clone();
        let request = signed_confirmation(&booking, "pay_race");
        tasks.push(tokio::spawn(async move {
            booking_service::confirm_payment(&state, &renter, request).await
        }));
    }
    for task in tasks {
        let resp = task.await??;
        assert_eq!(resp.data.expect("booking").status, BookingStatus::Confirmed);
    }

    assert_eq!(h.sink.settle(booking.id, NotificationKind::Confirmed, 1).await, 1);
    Ok(())
}

#[tokio::test]
async fn webhook_confirms_by_booking_reference() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-06-01", "2026-06-02"),
    )
    .await?
    .data
    .expect("booking");

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_hook",
            "order_id": booking.payment_id,
            "notes": { "bookingId": booking.id }
        } } }
    })
    .to_string();

    let sig = webhook_signature(body.as_bytes());
    let first =
        booking_service::process_payment_webhook(&h.state, Some(&sig), body.as_bytes()).await?;
    assert_eq!(first, WebhookOutcome::Confirmed(booking.id));
    let second =
        booking_service::process_payment_webhook(&h.state, Some(&sig), body.as_bytes()).await?;
    assert_eq!(second, WebhookOutcome::AlreadyConfirmed(booking.id));

    let stored = Bookings::find_by_id(booking.id).one(&h.state.orm).await?.expect("row");
    assert_eq!(stored.status, "confirmed");
    assert_eq!(stored.payment_status, "completed");
    assert_eq!(h.sink.settle(booking.id, NotificationKind::Confirmed, 1).await, 1);
    Ok(())
}

#[tokio::test]
async fn unsigned_webhook_never_confirms() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-06-05", "2026-06-06"),
    )
    .await?
    .data
    .expect("booking");

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "notes": { "bookingId": booking.id } } } }
    })
    .to_string();

    let err = booking_service::process_payment_webhook(&h.state, None, body.as_bytes()).await;
    assert!(matches!(err, Err(AppError::Unauthorized(_))));

    let stored = Bookings::find_by_id(booking.id).one(&h.state.orm).await?.expect("row");
    assert_eq!(stored.status, "pending");
    assert_eq!(stored.payment_status, "pending");
    Ok(())
}

#[tokio::test]
async fn webhook_resolves_booking_by_order_id() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-06-10", "2026-06-12"),
    )
    .await?
    .data
    .expect("booking");

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_by_order",
            "order_id": booking.payment_id,
        } } }
    })
    .to_string();

    let outcome = booking_service::process_payment_webhook(
        &h.state,
        Some(&webhook_signature(body.as_bytes())),
        body.as_bytes(),
    )
    .await?;
    assert_eq!(outcome, WebhookOutcome::Confirmed(booking.id));

    let stored = Bookings::find_by_id(booking.id).one(&h.state.orm).await?.expect("row");
    assert_eq!(stored.status, "confirmed");
    Ok(())
}

#[tokio::test]
async fn checkout_without_booking_id_resolves_by_order_id() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-06-15", "2026-06-17"),
    )
    .await?
    .data
    .expect("booking");

    let mut request = signed_confirmation(&booking, "pay_no_ref");
    request.booking_id = None;
    let confirmed = booking_service::confirm_payment(&h.state, &renter, request)
        .await?
        .data
        .expect("booking");
    assert_eq!(confirmed.id, booking.id);
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn webhook_for_superseded_order_is_ignored() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-06-20", "2026-06-21"),
    )
    .await?
    .data
    .expect("booking");
    let first_order = booking.payment_id.clone().expect("order id");

    let updated = booking_service::update_booking(
        &h.state,
        &renter,
        booking.id,
        UpdateBookingRequest {
            end_date: Some("2026-06-30".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("booking");
    assert_eq!(updated.total_price, 1000);
    assert_ne!(updated.payment_id.as_deref(), Some(first_order.as_str()));

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_old",
            "order_id": first_order,
            "amount": 10000,
            "notes": { "bookingId": booking.id }
        } } }
    })
    .to_string();

    let outcome = booking_service::process_payment_webhook(
        &h.state,
        Some(&webhook_signature(body.as_bytes())),
        body.as_bytes(),
    )
    .await?;
    assert_eq!(outcome, WebhookOutcome::Ignored("stale order"));

    let stored = Bookings::find_by_id(booking.id).one(&h.state.orm).await?.expect("row");
    assert_eq!(stored.status, "pending");
    assert_eq!(stored.payment_status, "pending");
    assert_eq!(h.sink.count(booking.id, NotificationKind::Confirmed), 0);
    Ok(())
}

#[tokio::test]
async fn updates_are_limited_to_pending_bookings_of_the_renter() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let stranger = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-07-01", "2026-07-03"),
    )
    .await?
    .data
    .expect("booking");

    let longer = || UpdateBookingRequest {
        end_date: Some("2026-07-06".into()),
        ..Default::default()
    };

    let updated = booking_service::update_booking(&h.state, &renter, booking.id, longer()).await?;
    let order = updated.order.clone().expect("new order for new total");
    let updated = updated.data.expect("booking");
    assert_eq!(updated.total_price, 500);
    assert_eq!(updated.payment_id.as_deref(), Some(order.id.as_str()));
    assert_eq!(order.amount, 50000);

    booking_service::confirm_payment(&h.state, &renter, signed_confirmation(&updated, "pay_upd"))
        .await?;

    let err = booking_service::update_booking(&h.state, &stranger, booking.id, longer())
        .await
        .expect_err("stranger");
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = booking_service::update_booking(&h.state, &renter, booking.id, longer())
        .await
        .expect_err("confirmed");
    assert!(matches!(err, AppError::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn rescheduling_checks_overlap_against_other_bookings() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let first = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-08-01", "2026-08-03"),
    )
    .await?
    .data
    .expect("booking");
    booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-08-05", "2026-08-07"),
    )
    .await?;

    // Shrinking within its own range never conflicts with itself.
    booking_service::update_booking(
        &h.state,
        &renter,
        first.id,
        UpdateBookingRequest {
            start_date: Some("2026-08-02".into()),
            ..Default::default()
        },
    )
    .await?;

    let err = booking_service::update_booking(
        &h.state,
        &renter,
        first.id,
        UpdateBookingRequest {
            end_date: Some("2026-08-06".into()),
            ..Default::default()
        },
    )
    .await
    .expect_err("overlap");
    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn only_the_renter_or_an_admin_may_cancel() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let stranger = create_user(&h.state, "user").await?;
    let admin = create_user(&h.state, "admin").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-09-01", "2026-09-02"),
    )
    .await?
    .data
    .expect("booking");

    let err = booking_service::cancel_booking(&h.state, &stranger, booking.id)
        .await
        .expect_err("stranger");
    assert!(matches!(err, AppError::Forbidden(_)));

    let stored = Bookings::find_by_id(booking.id).one(&h.state.orm).await?.expect("row");
    assert_eq!(stored.status, "pending");

    let view = booking_service::get_booking(&h.state, &stranger, booking.id).await;
    assert!(matches!(view, Err(AppError::Forbidden(_))));

    let cancelled = booking_service::cancel_booking(&h.state, &admin, booking.id).await?;
    assert_eq!(cancelled.data.expect("booking").status, BookingStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn gateway_failure_leaves_no_booking_behind() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    h.gateway.fail.store(true, Ordering::SeqCst);
    let err = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-10-01", "2026-10-03"),
    )
    .await
    .expect_err("gateway down");
    assert!(matches!(err, AppError::Upstream(_)));

    let stored = Bookings::find()
        .filter(BookingCol::ProductId.eq(product_id))
        .count(&h.state.orm)
        .await?;
    assert_eq!(stored, 0);

    h.gateway.fail.store(false, Ordering::SeqCst);
    booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-10-01", "2026-10-03"),
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_for_the_same_dates_admit_one() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let mut renters: Vec<AuthUser> = Vec::new();
    for _ in 0..8 {
        renters.push(create_user(&h.state, "user").await?);
    }

    let tasks: Vec<_> = renters
        .into_iter()
        .map(|renter| {
            let state = h.state.clone();
            tokio::spawn(async move {
                booking_service::create_booking(
                    &state,
                    &renter,
                    booking_request(product_id, "2026-11-10", "2026-11-15"),
                )
                .await
            })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => created += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    Ok(())
}

#[tokio::test]
async fn rental_lifecycle_runs_through_pickup_and_return() -> anyhow::Result<()> {
    let Some(url) = database_url() else { return Ok(()) };
    let h = setup(&url).await?;
    let owner = create_user(&h.state, "owner").await?;
    let renter = create_user(&h.state, "user").await?;
    let product_id = create_product(&h.state, &owner, 100).await?;

    let booking = booking_service::create_booking(
        &h.state,
        &renter,
        booking_request(product_id, "2026-12-01", "2026-12-04"),
    )
    .await?
    .data
    .expect("booking");

    let early = booking_service::activate_booking(&h.state, &owner, booking.id).await;
    assert!(matches!(early, Err(AppError::InvalidState(_))));

    booking_service::confirm_payment(&h.state, &renter, signed_confirmation(&booking, "pay_life"))
        .await?;

    let by_renter = booking_service::activate_booking(&h.state, &renter, booking.id).await;
    assert!(matches!(by_renter, Err(AppError::Forbidden(_))));

    let active = booking_service::activate_booking(&h.state, &owner, booking.id).await?;
    assert_eq!(active.data.expect("booking").status, BookingStatus::Active);

    let done = booking_service::complete_booking(&h.state, &renter, booking.id).await?;
    assert_eq!(done.data.expect("booking").status, BookingStatus::Completed);

    let cancel = booking_service::cancel_booking(&h.state, &renter, booking.id).await;
    assert!(matches!(cancel, Err(AppError::InvalidState(_))));

    let mine = booking_service::list_my_bookings(&h.state, &renter, Default::default()).await?;
    let items = mine.data.expect("list").items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product.as_ref().map(|p| p.id), Some(product_id));
    Ok(())
}
