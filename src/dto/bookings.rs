use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::booking::{DateRange, parse_calendar_date},
    error::{AppError, AppResult},
    models::{BookingDetail, Location},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub product_id: Uuid,
    pub start_date: String,
    pub end_date: String,
    pub location: Location,
}

/// A booking request that passed boundary validation.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub product_id: Uuid,
    pub range: DateRange,
    pub location: Location,
}

impl CreateBookingRequest {
    pub fn validate(self) -> AppResult<NewBooking> {
        let start = parse_calendar_date("start date", &self.start_date)?;
        let end = parse_calendar_date("end date", &self.end_date)?;
        let range = DateRange::new(start, end)?;
        let location = validate_location(self.location)?;
        Ok(NewBooking {
            product_id: self.product_id,
            range,
            location,
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateBookingRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingChanges {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub location: Option<Location>,
}

impl BookingChanges {
    pub fn changes_dates(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    /// Merge with the stored dates; the result must still be a valid range.
    pub fn resolve_range(&self, start: NaiveDate, end: NaiveDate) -> AppResult<DateRange> {
        DateRange::new(
            self.start_date.unwrap_or(start),
            self.end_date.unwrap_or(end),
        )
    }
}

impl UpdateBookingRequest {
    pub fn validate(self) -> AppResult<BookingChanges> {
        let start_date = self
            .start_date
            .as_deref()
            .map(|v| parse_calendar_date("start date", v))
            .transpose()?;
        let end_date = self
            .end_date
            .as_deref()
            .map(|v| parse_calendar_date("end date", v))
            .transpose()?;
        let location = self.location.map(validate_location).transpose()?;

        if start_date.is_none() && end_date.is_none() && location.is_none() {
            return Err(AppError::Validation("Nothing to update".into()));
        }
        Ok(BookingChanges {
            start_date,
            end_date,
            location,
        })
    }
}

fn validate_location(location: Location) -> AppResult<Location> {
    let address = location.address.trim();
    if address.is_empty() {
        return Err(AppError::Validation("Delivery address is required".into()));
    }
    if let Some([lng, lat]) = location.coordinates {
        if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(
                "Location coordinates must be [longitude, latitude]".into(),
            ));
        }
    }
    Ok(Location {
        address: address.to_string(),
        coordinates: location.coordinates,
    })
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct BookingList {
    #[schema(value_type = Vec<BookingDetail>)]
    pub items: Vec<BookingDetail>,
}

/// Checkout result posted by the client after paying on the gateway.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub razorpay_payment_id: Option<String>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_signature: Option<String>,
    #[serde(rename = "bookingId")]
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub payment_id: String,
    pub order_id: String,
    pub signature: String,
    pub booking_id: Option<Uuid>,
}

impl ConfirmPaymentRequest {
    pub fn validate(self) -> AppResult<PaymentConfirmation> {
        fn required(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }
        match (
            required(self.razorpay_payment_id),
            required(self.razorpay_order_id),
            required(self.razorpay_signature),
        ) {
            (Some(payment_id), Some(order_id), Some(signature)) => Ok(PaymentConfirmation {
                payment_id,
                order_id,
                signature,
                booking_id: self.booking_id,
            }),
            _ => Err(AppError::Validation("Missing payment details".into())),
        }
    }
}

/// Gateway webhook body: `{ event, payload }`.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PaymentWebhookEvent {
    pub const PAYMENT_CAPTURED: &'static str = "payment.captured";

    pub fn booking_id(&self) -> Option<Uuid> {
        self.payload
            .pointer("/payment/entity/notes/bookingId")
            .and_then(serde_json::Value::as_str)
            .and_then(|v| Uuid::parse_str(v).ok())
    }

    pub fn order_id(&self) -> Option<&str> {
        self.payload
            .pointer("/payment/entity/order_id")
            .and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(start: &str, end: &str, address: &str) -> CreateBookingRequest {
        CreateBookingRequest {
            product_id: Uuid::new_v4(),
            start_date: start.into(),
            end_date: end.into(),
            location: Location {
                address: address.into(),
                coordinates: Some([77.1, 28.6]),
            },
        }
    }

    #[test]
    fn create_request_yields_half_open_range() {
        let booking = create("2026-05-01", "2026-05-03", " Test address ")
            .validate()
            .expect("valid");
        assert_eq!(booking.range.days(), 2);
        assert_eq!(booking.location.address, "Test address");
    }

    #[test]
    fn create_request_rejects_bad_input() {
        assert!(matches!(
            create("2026-05-03", "2026-05-01", "x").validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create("05/01/2026", "2026-05-03", "x").validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create("2026-05-01", "2026-05-03", "   ").validate(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn update_request_rejects_status_field() {
        let body = r#"{"status":"confirmed"}"#;
        assert!(serde_json::from_str::<UpdateBookingRequest>(body).is_err());
    }

    #[test]
    fn update_with_one_date_merges_with_stored_range() {
        let changes = UpdateBookingRequest {
            end_date: Some("2026-04-20".into()),
            ..Default::default()
        }
        .validate()
        .expect("valid");
        let stored_start = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let stored_end = NaiveDate::from_ymd_opt(2026, 4, 15).unwrap();

        assert!(changes.changes_dates());
        let range = changes.resolve_range(stored_start, stored_end).expect("range");
        assert_eq!(range.days(), 10);
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(UpdateBookingRequest::default().validate().is_err());
    }

    #[test]
    fn confirmation_requires_all_three_identifiers() {
        let full = ConfirmPaymentRequest {
            razorpay_payment_id: Some("pay_1".into()),
            razorpay_order_id: Some("order_1".into()),
            razorpay_signature: Some("abc".into()),
            booking_id: None,
        };
        assert!(full.validate().is_ok());

        let missing = ConfirmPaymentRequest {
            razorpay_payment_id: Some("pay_1".into()),
            razorpay_order_id: Some("  ".into()),
            razorpay_signature: Some("abc".into()),
            booking_id: None,
        };
        let err = missing.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing payment details");
    }

    #[test]
    fn confirmation_keeps_identifiers_byte_for_byte() {
        let confirmation = ConfirmPaymentRequest {
            razorpay_payment_id: Some("pay_1".into()),
            razorpay_order_id: Some("order_1".into()),
            razorpay_signature: Some(" abc ".into()),
            booking_id: None,
        }
        .validate()
        .expect("valid");
        assert_eq!(confirmation.signature, " abc ");
    }

    #[test]
    fn webhook_extracts_booking_id_from_notes() {
        let booking_id = Uuid::new_v4();
        let event: PaymentWebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_1",
                "order_id": "order_1",
                "notes": { "bookingId": booking_id.to_string() }
            }}}
        }))
        .expect("parse");

        assert_eq!(event.booking_id(), Some(booking_id));
        assert_eq!(event.order_id(), Some("order_1"));
    }

    #[test]
    fn webhook_without_payload_has_no_booking() {
        let event: PaymentWebhookEvent =
            serde_json::from_str(r#"{"event":"order.paid"}"#).expect("parse");
        assert_eq!(event.booking_id(), None);
        assert_eq!(event.order_id(), None);
    }
}
