use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses whose date range reserves the product.
    pub const BLOCKING: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Active,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn blocks_dates(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Only pending bookings may have their dates or delivery location edited.
    pub fn is_editable(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Active, Cancelled)
                | (Confirmed, Active)
                | (Confirmed, Completed)
                | (Active, Completed)
        )
    }

    /// Every status that may move into `next`.
    pub fn sources_of(next: BookingStatus) -> Vec<BookingStatus> {
        ALL_STATUSES
            .iter()
            .copied()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }
}

const ALL_STATUSES: [BookingStatus; 5] = [
    BookingStatus::Pending,
    BookingStatus::Confirmed,
    BookingStatus::Active,
    BookingStatus::Completed,
    BookingStatus::Cancelled,
];

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("Unknown booking status '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(AppError::Validation(format!("Unknown payment status '{other}'"))),
        }
    }
}

/// Half-open calendar range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start >= end {
            return Err(AppError::Validation(
                "End date must be after start date".into(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn days(&self) -> i64 {
        // Calendar dates always differ by whole days, so this is already the ceiling.
        (self.end - self.start).num_days()
    }

    pub fn total_price(&self, price_per_day: i64) -> Result<i64, AppError> {
        if price_per_day < 0 {
            return Err(AppError::Validation("Price per day must not be negative".into()));
        }
        self.days()
            .checked_mul(price_per_day)
            .ok_or_else(|| AppError::Validation("Booking total is too large".into()))
    }
}

/// Existing reservation as seen by the overlap scan.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub id: Uuid,
    pub status: BookingStatus,
    pub range: DateRange,
}

/// First reservation that blocks `candidate`, ignoring `exclude` (the booking under edit).
pub fn find_conflict<'a, I>(
    candidate: &DateRange,
    existing: I,
    exclude: Option<Uuid>,
) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    existing.into_iter().find(|reservation| {
        Some(reservation.id) != exclude
            && reservation.status.blocks_dates()
            && reservation.range.overlaps(candidate)
    })
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (its calendar date is used).
pub fn parse_calendar_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| AppError::Validation(format!("Valid {field} is required")))
}

/// Renter of the booking or an administrator.
pub fn can_manage(caller_id: Uuid, caller_role: &str, renter_id: Uuid) -> bool {
    caller_id == renter_id || caller_role == "admin"
}
