use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{Location, Product, ProductCategory},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    pub price_per_day: i64,
    pub availability: Option<bool>,
    pub location: Location,
}

impl CreateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Product name is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(AppError::Validation("Product description is required".into()));
        }
        if self.price_per_day < 0 {
            return Err(AppError::Validation("Price must be positive".into()));
        }
        if self.location.address.trim().is_empty() {
            return Err(AppError::Validation("Location address is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ProductCategory>,
    pub price_per_day: Option<i64>,
    pub availability: Option<bool>,
    pub location: Option<Location>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::Validation("Product name must not be empty".into()));
        }
        if self.price_per_day.is_some_and(|p| p < 0) {
            return Err(AppError::Validation("Price must be positive".into()));
        }
        if self
            .location
            .as_ref()
            .is_some_and(|l| l.address.trim().is_empty())
        {
            return Err(AppError::Validation("Location address is required".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
