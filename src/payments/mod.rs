pub mod razorpay;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

pub use razorpay::RazorpayGateway;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderNotes {
    #[serde(rename = "bookingId")]
    pub booking_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Order creation request, `amount` in minor currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: OrderNotes,
}

impl OrderRequest {
    pub fn for_booking(
        booking_id: Uuid,
        renter_id: Uuid,
        total_price: i64,
        currency: &str,
    ) -> Result<Self, AppError> {
        let amount = total_price
            .checked_mul(100)
            .ok_or_else(|| AppError::Validation("Booking total is too large".into()))?;
        Ok(Self {
            amount,
            currency: currency.to_string(),
            receipt: format!("booking_{booking_id}"),
            notes: OrderNotes {
                booking_id: booking_id.to_string(),
                user_id: renter_id.to_string(),
            },
        })
    }
}

/// Order as returned by the gateway; handed to the client to open checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(String),

    #[error("payment gateway unavailable (status {status})")]
    Unavailable { status: u16, body: String },

    #[error("payment gateway rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transient failures may be retried; a definitive rejection never is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::Unavailable { .. }
        )
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError>;
}
