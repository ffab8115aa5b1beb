use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    domain::booking::{BookingStatus, PaymentStatus},
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        bookings::{
            BookingList, ConfirmPaymentRequest, CreateBookingRequest, UpdateBookingRequest,
            WebhookAck,
        },
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        reviews::{CreateReviewRequest, ReviewList},
    },
    models::{Booking, BookingDetail, Location, Product, ProductCategory, Review, ReviewWithAuthor, User},
    payments::GatewayOrder,
    response::{ApiResponse, Meta},
    routes::{auth, bookings, health, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::list_reviews,
        products::add_review,
        bookings::create_booking,
        bookings::confirm_payment,
        bookings::payment_webhook,
        bookings::my_bookings,
        bookings::get_booking,
        bookings::update_booking,
        bookings::cancel_booking,
        bookings::activate_booking,
        bookings::complete_booking
    ),
    components(
        schemas(
            User,
            Product,
            ProductCategory,
            Location,
            Booking,
            BookingDetail,
            BookingStatus,
            PaymentStatus,
            Review,
            ReviewWithAuthor,
            GatewayOrder,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateProductRequest,
            UpdateProductRequest,
            CreateBookingRequest,
            UpdateBookingRequest,
            ConfirmPaymentRequest,
            CreateReviewRequest,
            WebhookAck,
            ProductList,
            BookingList,
            ReviewList,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Booking>,
            ApiResponse<BookingList>,
            ApiResponse<Review>,
            ApiResponse<ReviewList>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Rental catalog"),
        (name = "Reviews", description = "Product reviews"),
        (name = "Bookings", description = "Booking and payment workflow"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
