use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ReviewWithAuthor;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ReviewList {
    #[schema(value_type = Vec<ReviewWithAuthor>)]
    pub items: Vec<ReviewWithAuthor>,
}
