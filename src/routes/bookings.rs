use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::bookings::{
        BookingList, ConfirmPaymentRequest, CreateBookingRequest, UpdateBookingRequest, WebhookAck,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Booking, BookingDetail},
    response::ApiResponse,
    routes::{
        extract::{AppJson, AppPath, AppQuery},
        params::BookingListQuery,
    },
    services::booking_service::{self, WebhookOutcome},
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_booking))
        .route("/confirm", post(confirm_payment))
        .route("/payment-webhook", post(payment_webhook))
        .route("/my-bookings", get(my_bookings))
        .route(
            "/{id}",
            get(get_booking).put(update_booking).delete(cancel_booking),
        )
        .route("/{id}/activate", post(activate_booking))
        .route("/{id}/complete", post(complete_booking))
}

#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Pending booking with its payment order", body = ApiResponse<Booking>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Dates overlap an existing booking"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Booking>>)> {
    let resp = booking_service::create_booking(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/bookings/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Booking confirmed", body = ApiResponse<Booking>),
        (status = 400, description = "Missing details or invalid signature"),
        (status = 404, description = "Booking not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<ConfirmPaymentRequest>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let resp = booking_service::confirm_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

/// Called by the gateway. Takes the raw body so the HMAC covers the exact bytes sent.
#[utoipa::path(
    post,
    path = "/api/bookings/payment-webhook",
    request_body(content = String, content_type = "application/json"),
    params(
        ("X-Razorpay-Signature" = Option<String>, Header, description = "hex HMAC-SHA256 of the body")
    ),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Bad or missing signature")
    ),
    tag = "Bookings"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match booking_service::process_payment_webhook(&state, signature, &body).await? {
        WebhookOutcome::Confirmed(id) => tracing::debug!(booking_id = %id, "webhook confirmed booking"),
        WebhookOutcome::AlreadyConfirmed(id) => {
            tracing::debug!(booking_id = %id, "webhook for already confirmed booking")
        }
        WebhookOutcome::Ignored(reason) => tracing::debug!(reason, "webhook ignored"),
    }
    Ok(Json(WebhookAck::ok()))
}

#[utoipa::path(
    get,
    path = "/api/bookings/my-bookings",
    params(BookingListQuery),
    responses(
        (status = 200, description = "Caller's bookings, newest first", body = ApiResponse<BookingList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn my_bookings(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<BookingListQuery>,
) -> AppResult<Json<ApiResponse<BookingList>>> {
    let resp = booking_service::list_my_bookings(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking with product", body = ApiResponse<BookingDetail>),
        (status = 403, description = "Not the renter"),
        (status = 404, description = "Booking not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<BookingDetail>>> {
    let resp = booking_service::get_booking(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = UpdateBookingRequest,
    responses(
        (status = 200, description = "Booking updated", body = ApiResponse<Booking>),
        (status = 400, description = "Booking no longer editable"),
        (status = 409, description = "New dates overlap")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn update_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateBookingRequest>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let resp = booking_service::update_booking(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking cancelled", body = ApiResponse<Booking>),
        (status = 403, description = "Not the renter")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let resp = booking_service::cancel_booking(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/activate",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Rental started", body = ApiResponse<Booking>)
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn activate_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let resp = booking_service::activate_booking(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/complete",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Rental completed", body = ApiResponse<Booking>)
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn complete_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let resp = booking_service::complete_booking(&state, &user, id).await?;
    Ok(Json(resp))
}
