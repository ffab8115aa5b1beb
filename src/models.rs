use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::booking::{BookingStatus, PaymentStatus};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Laptops,
    Cameras,
    Audio,
    Gaming,
    Smartphones,
    Tablets,
    Accessories,
    Other,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Laptops => "laptops",
            ProductCategory::Cameras => "cameras",
            ProductCategory::Audio => "audio",
            ProductCategory::Gaming => "gaming",
            ProductCategory::Smartphones => "smartphones",
            ProductCategory::Tablets => "tablets",
            ProductCategory::Accessories => "accessories",
            ProductCategory::Other => "other",
        }
    }

    /// Unknown stored values fall back to `Other`.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "laptops" => ProductCategory::Laptops,
            "cameras" => ProductCategory::Cameras,
            "audio" => ProductCategory::Audio,
            "gaming" => ProductCategory::Gaming,
            "smartphones" => ProductCategory::Smartphones,
            "tablets" => ProductCategory::Tablets,
            "accessories" => ProductCategory::Accessories,
            _ => ProductCategory::Other,
        }
    }
}

/// Address with optional `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<f64>>)]
    pub coordinates: Option<[f64; 2]>,
}

impl Location {
    pub fn from_parts(address: String, longitude: Option<f64>, latitude: Option<f64>) -> Self {
        let coordinates = match (longitude, latitude) {
            (Some(lng), Some(lat)) => Some([lng, lat]),
            _ => None,
        };
        Self {
            address,
            coordinates,
        }
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c[0])
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c[1])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    pub price_per_day: i64,
    pub availability: bool,
    pub average_rating: f64,
    pub reviews_count: i32,
    pub location: Location,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: i64,
    pub location: Location,
    pub status: BookingStatus,
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking with its product, as listed on the renter's dashboard.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: Review,
    pub user_name: Option<String>,
}
