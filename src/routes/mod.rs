use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod bookings;
pub mod doc;
pub mod extract;
pub mod health;
pub mod params;
pub mod products;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/products", products::router())
        .nest("/bookings", bookings::router())
}
