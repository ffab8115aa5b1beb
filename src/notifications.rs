//! Booking notifications, delivered off the request path.
//!
//! Delivery is at-most-once: a notification is handed to a single background
//! worker and dropped (with a warning) if the sink fails or the queue is
//! already closed. Callers never observe delivery errors.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, Set};
use serde::Serialize;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{db::OrmConn, entity::notifications::ActiveModel, models::Booking};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Created,
    Confirmed,
    Updated,
    Cancelled,
    Activated,
    Completed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Created => "created",
            NotificationKind::Confirmed => "confirmed",
            NotificationKind::Updated => "updated",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::Activated => "activated",
            NotificationKind::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingNotification {
    pub kind: NotificationKind,
    pub booking_id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub total_price: i64,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
}

impl BookingNotification {
    pub fn new(kind: NotificationKind, booking: &Booking) -> Self {
        Self {
            kind,
            booking_id: booking.id,
            product_id: booking.product_id,
            user_id: booking.user_id,
            total_price: booking.total_price,
            start_date: booking.start_date,
            end_date: booking.end_date,
        }
    }

    pub fn message(&self) -> String {
        let dates = format!("{} to {}", self.start_date, self.end_date);
        match self.kind {
            NotificationKind::Created => format!(
                "Your booking for {dates} has been created. Total: {}. Complete payment to confirm it.",
                self.total_price
            ),
            NotificationKind::Confirmed => {
                format!("Payment received. Your booking for {dates} is confirmed.")
            }
            NotificationKind::Updated => format!(
                "Your booking has been updated to {dates}. Total: {}.",
                self.total_price
            ),
            NotificationKind::Cancelled => format!("Your booking for {dates} has been cancelled."),
            NotificationKind::Activated => format!("Your rental for {dates} is now active."),
            NotificationKind::Completed => format!(
                "Your rental for {dates} is complete. You can now review the product."
            ),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, notification: &BookingNotification) -> anyhow::Result<()>;
}

/// Stores notifications in the user's inbox table.
pub struct DbNotificationSink {
    conn: OrmConn,
}

impl DbNotificationSink {
    pub fn new(conn: OrmConn) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NotificationSink for DbNotificationSink {
    async fn deliver(&self, notification: &BookingNotification) -> anyhow::Result<()> {
        let message = notification.message();
        ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(notification.booking_id),
            user_id: Set(Some(notification.user_id)),
            kind: Set(notification.kind.as_str().to_string()),
            message: Set(message.clone()),
            created_at: NotSet,
        }
        .insert(&self.conn)
        .await?;

        tracing::info!(
            booking_id = %notification.booking_id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            %message,
            "booking notification stored"
        );
        Ok(())
    }
}

enum Command {
    Deliver(BookingNotification),
    Shutdown,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Command>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NotificationDispatcher {
    /// Start the delivery worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Deliver(notification) => {
                        if let Err(err) = sink.deliver(&notification).await {
                            tracing::warn!(
                                error = %err,
                                booking_id = %notification.booking_id,
                                kind = notification.kind.as_str(),
                                "notification delivery failed"
                            );
                        }
                    }
                    Command::Shutdown => break,
                }
            }
        });

        Self {
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    pub fn dispatch(&self, notification: BookingNotification) {
        let booking_id = notification.booking_id;
        if self.tx.send(Command::Deliver(notification)).is_err() {
            tracing::warn!(%booking_id, "notification queue closed, dropping notification");
        }
    }

    /// Deliver everything queued so far, then stop the worker.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "notification worker ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::domain::booking::{BookingStatus, PaymentStatus};
    use crate::models::Location;

    #[derive(Default)]
    struct Recording {
        seen: StdMutex<Vec<NotificationKind>>,
    }

    #[async_trait]
    impl NotificationSink for Recording {
        async fn deliver(&self, notification: &BookingNotification) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(notification.kind);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationSink for Failing {
        async fn deliver(&self, _notification: &BookingNotification) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    fn booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
            total_price: 300,
            location: Location {
                address: "12 MG Road".into(),
                coordinates: None,
            },
            status: BookingStatus::Pending,
            payment_id: None,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn queued_notifications_are_delivered_in_order_before_shutdown() {
        let sink = Arc::new(Recording::default());
        let dispatcher = NotificationDispatcher::spawn(sink.clone());
        let booking = booking();

        dispatcher.dispatch(BookingNotification::new(NotificationKind::Created, &booking));
        dispatcher.dispatch(BookingNotification::new(NotificationKind::Confirmed, &booking));
        dispatcher.shutdown().await;

        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![NotificationKind::Created, NotificationKind::Confirmed]
        );
    }

    #[tokio::test]
    async fn sink_failures_and_closed_queue_never_reach_the_caller() {
        let dispatcher = NotificationDispatcher::spawn(Arc::new(Failing));
        let booking = booking();

        dispatcher.dispatch(BookingNotification::new(NotificationKind::Created, &booking));
        dispatcher.shutdown().await;
        dispatcher.dispatch(BookingNotification::new(NotificationKind::Updated, &booking));
        dispatcher.shutdown().await;
    }

    #[test]
    fn messages_mention_dates_and_totals() {
        let booking = booking();
        let created = BookingNotification::new(NotificationKind::Created, &booking).message();
        assert!(created.contains("2026-05-01 to 2026-05-03"));
        assert!(created.contains("300"));
    }
}
