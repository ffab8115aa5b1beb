#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use rental_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    dto::bookings::CreateBookingRequest,
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    middleware::auth::AuthUser,
    models::Location,
    notifications::{BookingNotification, NotificationKind, NotificationSink},
    payments::{GatewayError, GatewayOrder, OrderRequest, PaymentGateway, signature},
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, Set};
use uuid::Uuid;

/// Integration tests skip themselves when no database is configured.
pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
            None
        }
    }
}

pub struct Harness {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub sink: Arc<RecordingSink>,
}

pub async fn setup(database_url: &str) -> anyhow::Result<Harness> {
    setup_with(AppConfig::for_database(database_url)).await
}

pub async fn setup_with(config: AppConfig) -> anyhow::Result<Harness> {
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    Ok(harness(orm, config))
}

pub fn harness(orm: OrmConn, config: AppConfig) -> Harness {
    let gateway = Arc::new(FakeGateway::default());
    let sink = Arc::new(RecordingSink::default());
    let state = AppState::new(orm, config, gateway.clone(), sink.clone());
    Harness {
        state,
        gateway,
        sink,
    }
}

/// Answers with `order_<n>` ids and can be switched into a failing mode.
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<OrderRequest>>,
    pub fail: AtomicBool,
    counter: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable {
                status: 503,
                body: "maintenance".into(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrder {
            id: format!("order_{}_{n}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".into()),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub seen: Mutex<Vec<BookingNotification>>,
}

impl RecordingSink {
    pub fn count(&self, booking_id: Uuid, kind: NotificationKind) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.booking_id == booking_id && n.kind == kind)
            .count()
    }

    /// Wait until `expected` notifications of `kind` arrived, then a little longer to catch extras.
    pub async fn settle(&self, booking_id: Uuid, kind: NotificationKind, expected: usize) -> usize {
        for _ in 0..100 {
            if self.count(booking_id, kind) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.count(booking_id, kind)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &BookingNotification) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        name: Set(format!("{role} {}", &id.to_string()[..8])),
        email: Set(format!("{id}@example.com")),
        password_hash: Set("not-a-real-hash".into()),
        phone: Set(None),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(AuthUser {
        user_id: id,
        role: role.into(),
    })
}

pub async fn create_product(
    state: &AppState,
    owner: &AuthUser,
    price_per_day: i64,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    ProductActive {
        id: Set(id),
        owner_id: Set(owner.user_id),
        name: Set("Sony A7 III".into()),
        description: Set("Full-frame mirrorless camera".into()),
        category: Set("cameras".into()),
        price_per_day: Set(price_per_day),
        availability: Set(true),
        average_rating: Set(0.0),
        reviews_count: Set(0),
        address: Set("Pune".into()),
        longitude: Set(Some(73.8567)),
        latitude: Set(Some(18.5204)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn booking_request(product_id: Uuid, start: &str, end: &str) -> CreateBookingRequest {
    CreateBookingRequest {
        product_id,
        start_date: start.into(),
        end_date: end.into(),
        location: Location {
            address: "12 MG Road, Pune".into(),
            coordinates: Some([73.85, 18.52]),
        },
    }
}

pub fn checkout_signature(key_secret: &str, order_id: &str, payment_id: &str) -> String {
    signature::sign(key_secret, format!("{order_id}|{payment_id}").as_bytes()).unwrap()
}

/// Signs a webhook body with the secret from `AppConfig::for_database`.
pub fn webhook_signature(body: &[u8]) -> String {
    signature::sign("test_webhook_secret", body).unwrap()
}
