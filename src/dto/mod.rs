pub mod auth;
pub mod bookings;
pub mod products;
pub mod reviews;
