use std::str::FromStr;

use chrono::Utc;
use sea_orm::ActiveValue::{self, NotSet};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    domain::booking::{BookingStatus, DateRange, PaymentStatus, Reservation, can_manage, find_conflict},
    dto::bookings::{
        BookingList, ConfirmPaymentRequest, CreateBookingRequest, PaymentWebhookEvent,
        UpdateBookingRequest,
    },
    entity::{
        bookings::{ActiveModel as BookingActive, Column as BookingCol, Entity as Bookings, Model as BookingModel},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult, is_exclusion_violation},
    middleware::auth::AuthUser,
    models::{Booking, BookingDetail, Location},
    notifications::{BookingNotification, NotificationKind},
    payments::{OrderRequest, signature},
    response::{ApiResponse, Meta},
    routes::params::BookingListQuery,
    services::product_service::product_from_entity,
    state::AppState,
};

const OVERLAP_MESSAGE: &str = "Product is already booked for the selected dates";

/// What a webhook delivery did; the gateway is acknowledged either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed(Uuid),
    AlreadyConfirmed(Uuid),
    Ignored(&'static str),
}

pub async fn create_booking(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBookingRequest,
) -> AppResult<ApiResponse<Booking>> {
    let request = payload.validate()?;

    let _product_lock = state.product_locks.acquire(request.product_id).await;
    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(request.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    if !product.availability {
        return Err(AppError::Validation("Product is not available".into()));
    }

    ensure_no_overlap(&txn, product.id, &request.range, None).await?;
    let total_price = request.range.total_price(product.price_per_day)?;

    let booking_id = Uuid::new_v4();
    let inserted = BookingActive {
        id: Set(booking_id),
        product_id: Set(product.id),
        user_id: Set(user.user_id),
        start_date: Set(request.range.start()),
        end_date: Set(request.range.end()),
        total_price: Set(total_price),
        delivery_address: Set(request.location.address.clone()),
        delivery_longitude: Set(request.location.longitude()),
        delivery_latitude: Set(request.location.latitude()),
        status: Set(BookingStatus::Pending.as_str().into()),
        payment_id: Set(None),
        payment_status: Set(PaymentStatus::Pending.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(overlap_or_db)?;

    let order_request = OrderRequest::for_booking(
        booking_id,
        user.user_id,
        total_price,
        &state.config.payment_currency,
    )?;
    let order = match state.gateway.create_order(&order_request).await {
        Ok(order) => order,
        Err(err) => {
            tracing::warn!(
                %booking_id,
                product_id = %product.id,
                error = %err,
                "payment order failed, discarding booking"
            );
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(error = %rollback, %booking_id, "rollback failed");
            }
            return Err(err.into());
        }
    };

    let mut active: BookingActive = inserted.into();
    active.payment_id = Set(Some(order.id.clone()));
    let saved = active.update(&txn).await?;
    txn.commit().await?;

    let booking = booking_from_entity(saved)?;
    tracing::info!(
        booking_id = %booking.id,
        product_id = %booking.product_id,
        order_id = %order.id,
        total_price = booking.total_price,
        "booking created"
    );

    notify(state, &booking, NotificationKind::Created);
    audit::record(
        &state.orm,
        Some(user.user_id),
        "booking_create",
        "bookings",
        serde_json::json!({ "booking_id": booking.id, "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success("Booking created", booking, Some(Meta::empty())).with_order(order))
}

pub async fn confirm_payment(
    state: &AppState,
    user: &AuthUser,
    payload: ConfirmPaymentRequest,
) -> AppResult<ApiResponse<Booking>> {
    let confirmation = payload.validate()?;

    if !signature::verify_payment_signature(
        &state.config.razorpay_key_secret,
        &confirmation.order_id,
        &confirmation.payment_id,
        &confirmation.signature,
    ) {
        tracing::warn!(order_id = %confirmation.order_id, "payment signature mismatch");
        return Err(AppError::PaymentVerification(
            "Invalid payment signature".into(),
        ));
    }

    let booking = match confirmation.booking_id {
        Some(id) => Bookings::find_by_id(id).one(&state.orm).await?,
        None => find_by_order_id(&state.orm, &confirmation.order_id).await?,
    }
    .ok_or_else(|| AppError::not_found("Booking"))?;

    ensure_can_manage(user, &booking, "confirm")?;

    if booking
        .payment_id
        .as_deref()
        .is_some_and(|order_id| order_id != confirmation.order_id)
    {
        return Err(AppError::PaymentVerification(
            "Payment order does not belong to this booking".into(),
        ));
    }

    let (model, applied) = mark_confirmed(&state.orm, booking).await?;
    let booking = booking_from_entity(model)?;

    if !applied {
        tracing::debug!(booking_id = %booking.id, "payment already confirmed");
        return Ok(ApiResponse::success(
            "Payment already confirmed",
            booking,
            Some(Meta::empty()),
        ));
    }

    tracing::info!(
        booking_id = %booking.id,
        order_id = %confirmation.order_id,
        payment_id = %confirmation.payment_id,
        "payment confirmed"
    );
    notify(state, &booking, NotificationKind::Confirmed);
    audit::record(
        &state.orm,
        Some(user.user_id),
        "booking_confirm",
        "bookings",
        serde_json::json!({ "booking_id": booking.id, "payment_id": confirmation.payment_id }),
    )
    .await;

    Ok(ApiResponse::success("Payment confirmed", booking, Some(Meta::empty())))
}

/// Verify transport authenticity, then apply `payment.captured` events.
/// Business outcomes are always acknowledged; only bad signatures, bad
/// bodies and storage failures surface as errors.
pub async fn process_payment_webhook(
    state: &AppState,
    signature_header: Option<&str>,
    body: &[u8],
) -> AppResult<WebhookOutcome> {
    let secret = &state.config.razorpay_webhook_secret;
    if secret.is_empty() {
        if !state.config.razorpay_webhook_insecure {
            tracing::error!("webhook received but no webhook secret is configured");
            return Err(AppError::Unauthorized("Webhook signature cannot be verified".into()));
        }
        tracing::debug!("accepting unsigned webhook in insecure mode");
    } else {
        let Some(sig) = signature_header.filter(|s| !s.is_empty()) else {
            tracing::warn!("webhook without signature header");
            return Err(AppError::Unauthorized("Missing webhook signature".into()));
        };
        if !signature::verify_webhook_signature(secret, body, sig) {
            tracing::warn!("webhook signature mismatch");
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        }
    }

    let event: PaymentWebhookEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;

    if event.event != PaymentWebhookEvent::PAYMENT_CAPTURED {
        tracing::debug!(event = %event.event, "ignoring webhook event");
        return Ok(WebhookOutcome::Ignored("unhandled event"));
    }

    let booking = if let Some(id) = event.booking_id() {
        Bookings::find_by_id(id).one(&state.orm).await?
    } else if let Some(order_id) = event.order_id() {
        find_by_order_id(&state.orm, order_id).await?
    } else {
        tracing::warn!("payment.captured without booking reference");
        return Ok(WebhookOutcome::Ignored("no booking reference"));
    };

    let Some(booking) = booking else {
        tracing::warn!(booking_id = ?event.booking_id(), "payment.captured for unknown booking");
        return Ok(WebhookOutcome::Ignored("booking not found"));
    };

    let booking_id = booking.id;
    if let (Some(event_order), Some(current_order)) = (event.order_id(), booking.payment_id.as_deref())
    {
        if event_order != current_order {
            tracing::warn!(
                %booking_id,
                event_order,
                current_order,
                "payment.captured for a superseded order"
            );
            return Ok(WebhookOutcome::Ignored("stale order"));
        }
    }

    match mark_confirmed(&state.orm, booking).await {
        Ok((model, true)) => {
            let booking = booking_from_entity(model)?;
            tracing::info!(%booking_id, "payment captured via webhook");
            notify(state, &booking, NotificationKind::Confirmed);
            audit::record(
                &state.orm,
                None,
                "booking_confirm_webhook",
                "bookings",
                serde_json::json!({ "booking_id": booking_id }),
            )
            .await;
            Ok(WebhookOutcome::Confirmed(booking_id))
        }
        Ok((_, false)) => Ok(WebhookOutcome::AlreadyConfirmed(booking_id)),
        Err(AppError::InvalidState(reason)) => {
            tracing::warn!(%booking_id, %reason, "payment captured for booking that cannot be confirmed");
            Ok(WebhookOutcome::Ignored("booking cannot be confirmed"))
        }
        Err(err) => Err(err),
    }
}

pub async fn list_my_bookings(
    state: &AppState,
    user: &AuthUser,
    query: BookingListQuery,
) -> AppResult<ApiResponse<BookingList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(BookingCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(BookingCol::Status.eq(status.as_str()));
    }

    let finder = Bookings::find()
        .filter(condition)
        .order_by_desc(BookingCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Products)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(detail_from_entities)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Ok",
        BookingList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<BookingDetail>> {
    let (booking, product) = Bookings::find_by_id(id)
        .find_also_related(Products)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))?;

    ensure_can_manage(user, &booking, "view")?;

    Ok(ApiResponse::success(
        "OK",
        detail_from_entities((booking, product))?,
        Some(Meta::empty()),
    ))
}

pub async fn update_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBookingRequest,
) -> AppResult<ApiResponse<Booking>> {
    let existing = find_booking(&state.orm, id).await?;
    ensure_can_manage(user, &existing, "update")?;
    ensure_editable(&existing)?;
    let changes = payload.validate()?;

    let _product_lock = state.product_locks.acquire(existing.product_id).await;
    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(existing.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;
    let current = Bookings::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))?;
    // Status may have moved while waiting for the lock.
    ensure_editable(&current)?;

    let previous_total = current.total_price;
    let mut active: BookingActive = current.clone().into();

    if changes.changes_dates() {
        let range = changes.resolve_range(current.start_date, current.end_date)?;
        ensure_no_overlap(&txn, current.product_id, &range, Some(current.id)).await?;
        active.start_date = Set(range.start());
        active.end_date = Set(range.end());
        active.total_price = Set(range.total_price(product.price_per_day)?);
    }
    if let Some(location) = &changes.location {
        active.delivery_address = Set(location.address.clone());
        active.delivery_longitude = Set(location.longitude());
        active.delivery_latitude = Set(location.latitude());
    }

    // A changed total needs a fresh gateway order; the old one can no longer be paid.
    let mut new_order = None;
    if let ActiveValue::Set(total) = &active.total_price {
        if *total != previous_total {
            let request = OrderRequest::for_booking(
                current.id,
                current.user_id,
                *total,
                &state.config.payment_currency,
            )?;
            let order = match state.gateway.create_order(&request).await {
                Ok(order) => order,
                Err(err) => {
                    tracing::warn!(booking_id = %current.id, error = %err, "payment order for updated booking failed");
                    if let Err(rollback) = txn.rollback().await {
                        tracing::warn!(error = %rollback, booking_id = %current.id, "rollback failed");
                    }
                    return Err(err.into());
                }
            };
            active.payment_id = Set(Some(order.id.clone()));
            new_order = Some(order);
        }
    }

    active.updated_at = Set(Utc::now().into());
    let saved = active.update(&txn).await.map_err(overlap_or_db)?;
    txn.commit().await?;

    let booking = booking_from_entity(saved)?;
    tracing::info!(booking_id = %booking.id, total_price = booking.total_price, "booking updated");
    notify(state, &booking, NotificationKind::Updated);
    audit::record(
        &state.orm,
        Some(user.user_id),
        "booking_update",
        "bookings",
        serde_json::json!({ "booking_id": booking.id }),
    )
    .await;

    let response = ApiResponse::success("Booking updated", booking, Some(Meta::empty()));
    Ok(match new_order {
        Some(order) => response.with_order(order),
        None => response,
    })
}

/// Cancels from any non-terminal status. No refund is issued here.
pub async fn cancel_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Booking>> {
    let existing = find_booking(&state.orm, id).await?;
    ensure_can_manage(user, &existing, "cancel")?;

    match parse_stored::<BookingStatus>(&existing.status)? {
        BookingStatus::Cancelled => {
            return Ok(ApiResponse::success(
                "Booking already cancelled",
                booking_from_entity(existing)?,
                Some(Meta::empty()),
            ));
        }
        BookingStatus::Completed => {
            return Err(AppError::InvalidState(
                "Completed bookings cannot be cancelled".into(),
            ));
        }
        _ => {}
    }

    advance(
        state,
        user,
        existing,
        BookingStatus::Cancelled,
        NotificationKind::Cancelled,
        "booking_cancel",
        "Booking cancelled successfully",
    )
    .await
}

/// Rental pickup: `confirmed → active`, by the product owner or an admin.
pub async fn activate_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Booking>> {
    let existing = find_booking(&state.orm, id).await?;
    let product = find_product(&state.orm, existing.product_id).await?;

    if !(user.is_admin() || product.owner_id == user.user_id) {
        return Err(AppError::Forbidden(
            "Only the product owner or an admin can start this rental".into(),
        ));
    }

    advance(
        state,
        user,
        existing,
        BookingStatus::Active,
        NotificationKind::Activated,
        "booking_activate",
        "Rental started",
    )
    .await
}

/// Rental return: `confirmed|active → completed`, by the renter, the product owner or an admin.
pub async fn complete_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Booking>> {
    let existing = find_booking(&state.orm, id).await?;
    if !can_manage(user.user_id, &user.role, existing.user_id) {
        let product = find_product(&state.orm, existing.product_id).await?;
        if product.owner_id != user.user_id {
            return Err(AppError::Forbidden(
                "Not authorized to complete this booking".into(),
            ));
        }
    }

    advance(
        state,
        user,
        existing,
        BookingStatus::Completed,
        NotificationKind::Completed,
        "booking_complete",
        "Booking marked as completed",
    )
    .await
}

async fn advance(
    state: &AppState,
    user: &AuthUser,
    existing: BookingModel,
    to: BookingStatus,
    kind: NotificationKind,
    action: &str,
    message: &str,
) -> AppResult<ApiResponse<Booking>> {
    let from = parse_stored::<BookingStatus>(&existing.status)?;
    if !from.can_transition_to(to) {
        return Err(AppError::InvalidState(format!(
            "Cannot move booking from {from} to {to}"
        )));
    }

    let applied = transition(
        &state.orm,
        existing.id,
        &BookingStatus::sources_of(to),
        to,
        None,
    )
    .await?;
    let fresh = find_booking(&state.orm, existing.id).await?;
    if !applied {
        return Err(AppError::InvalidState(format!(
            "Booking is now {}",
            fresh.status
        )));
    }

    let booking = booking_from_entity(fresh)?;
    tracing::info!(booking_id = %booking.id, %from, %to, "booking status changed");
    notify(state, &booking, kind);
    audit::record(
        &state.orm,
        Some(user.user_id),
        action,
        "bookings",
        serde_json::json!({ "booking_id": booking.id, "from": from, "to": to }),
    )
    .await;

    Ok(ApiResponse::success(message, booking, Some(Meta::empty())))
}

/// `pending → confirmed` with payment completed. Returns whether this call
/// performed the transition; exactly one concurrent caller can win.
async fn mark_confirmed<C: ConnectionTrait>(
    conn: &C,
    booking: BookingModel,
) -> AppResult<(BookingModel, bool)> {
    match parse_stored::<BookingStatus>(&booking.status)? {
        BookingStatus::Pending => {}
        BookingStatus::Cancelled => {
            return Err(AppError::InvalidState("Booking has been cancelled".into()));
        }
        _ => return Ok((booking, false)),
    }

    let applied = transition(
        conn,
        booking.id,
        &[BookingStatus::Pending],
        BookingStatus::Confirmed,
        Some(PaymentStatus::Completed),
    )
    .await?;

    let fresh = find_booking(conn, booking.id).await?;
    if !applied && parse_stored::<BookingStatus>(&fresh.status)? == BookingStatus::Cancelled {
        return Err(AppError::InvalidState("Booking has been cancelled".into()));
    }
    Ok((fresh, applied))
}

/// Conditional status update; succeeds only while the row is still in one of `from`.
async fn transition<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
    from: &[BookingStatus],
    to: BookingStatus,
    payment: Option<PaymentStatus>,
) -> AppResult<bool> {
    let mut update = Bookings::update_many()
        .col_expr(BookingCol::Status, Expr::value(to.as_str()))
        .col_expr(BookingCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(BookingCol::Id.eq(booking_id))
        .filter(BookingCol::Status.is_in(from.iter().map(BookingStatus::as_str)));
    if let Some(payment) = payment {
        update = update.col_expr(BookingCol::PaymentStatus, Expr::value(payment.as_str()));
    }
    let result = update.exec(conn).await?;
    Ok(result.rows_affected == 1)
}

async fn ensure_no_overlap<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    range: &DateRange,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let candidates = Bookings::find()
        .filter(BookingCol::ProductId.eq(product_id))
        .filter(BookingCol::Status.is_in(BookingStatus::BLOCKING.iter().map(BookingStatus::as_str)))
        .filter(BookingCol::StartDate.lt(range.end()))
        .filter(BookingCol::EndDate.gt(range.start()))
        .all(conn)
        .await?;

    let existing = candidates
        .iter()
        .map(reservation_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    if let Some(conflict) = find_conflict(range, &existing, exclude) {
        tracing::debug!(
            %product_id,
            conflicting_booking = %conflict.id,
            start = %range.start(),
            end = %range.end(),
            "booking dates overlap"
        );
        return Err(AppError::Conflict(OVERLAP_MESSAGE.into()));
    }
    Ok(())
}

fn overlap_or_db(err: DbErr) -> AppError {
    if is_exclusion_violation(&err) {
        AppError::Conflict(OVERLAP_MESSAGE.into())
    } else {
        err.into()
    }
}

fn ensure_can_manage(user: &AuthUser, booking: &BookingModel, action: &str) -> AppResult<()> {
    if !can_manage(user.user_id, &user.role, booking.user_id) {
        return Err(AppError::Forbidden(format!(
            "Not authorized to {action} this booking"
        )));
    }
    Ok(())
}

fn ensure_editable(booking: &BookingModel) -> AppResult<()> {
    if !parse_stored::<BookingStatus>(&booking.status)?.is_editable() {
        return Err(AppError::InvalidState(
            "Cannot update booking in current status".into(),
        ));
    }
    Ok(())
}

async fn find_booking<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<BookingModel> {
    Bookings::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))
}

async fn find_product<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))
}

async fn find_by_order_id<C: ConnectionTrait>(
    conn: &C,
    order_id: &str,
) -> AppResult<Option<BookingModel>> {
    Ok(Bookings::find()
        .filter(BookingCol::PaymentId.eq(order_id))
        .one(conn)
        .await?)
}

fn notify(state: &AppState, booking: &Booking, kind: NotificationKind) {
    state
        .notifier
        .dispatch(BookingNotification::new(kind, booking));
}

/// Stored enum columns are written by this crate; anything else is corruption.
fn parse_stored<T: FromStr<Err = AppError>>(value: &str) -> AppResult<T> {
    value
        .parse::<T>()
        .map_err(|err| AppError::Internal(anyhow::anyhow!("corrupt booking row: {err}")))
}

fn reservation_from_entity(model: &BookingModel) -> AppResult<Reservation> {
    Ok(Reservation {
        id: model.id,
        status: parse_stored(&model.status)?,
        range: DateRange::new(model.start_date, model.end_date)?,
    })
}

pub(crate) fn booking_from_entity(model: BookingModel) -> AppResult<Booking> {
    Ok(Booking {
        id: model.id,
        product_id: model.product_id,
        user_id: model.user_id,
        start_date: model.start_date,
        end_date: model.end_date,
        total_price: model.total_price,
        location: Location::from_parts(
            model.delivery_address,
            model.delivery_longitude,
            model.delivery_latitude,
        ),
        status: parse_stored(&model.status)?,
        payment_id: model.payment_id,
        payment_status: parse_stored(&model.payment_status)?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn detail_from_entities(
    (booking, product): (BookingModel, Option<ProductModel>),
) -> AppResult<BookingDetail> {
    Ok(BookingDetail {
        booking: booking_from_entity(booking)?,
        product: product.map(product_from_entity),
    })
}
