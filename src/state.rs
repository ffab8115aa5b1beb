use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::OrmConn,
    notifications::{NotificationDispatcher, NotificationSink},
    payments::PaymentGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: NotificationDispatcher,
    pub product_locks: ProductLocks,
}

impl AppState {
    /// Must be called inside a tokio runtime: it starts the notification worker.
    pub fn new(
        orm: OrmConn,
        config: AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            orm,
            config: Arc::new(config),
            gateway,
            notifier: NotificationDispatcher::spawn(sink),
            product_locks: ProductLocks::default(),
        }
    }

    /// Flush queued notifications and close the database pool.
    pub async fn shutdown(self) {
        self.notifier.shutdown().await;
        if let Err(err) = self.orm.close().await {
            tracing::warn!(error = %err, "failed to close database connection");
        }
    }
}

/// Serializes check-then-write sequences per product within this process.
#[derive(Clone, Default)]
pub struct ProductLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ProductLocks {
    pub async fn acquire(&self, product_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Drop entries nobody is holding or waiting on.
            locks.retain(|id, lock| *id == product_id || Arc::strong_count(lock) > 1);
            locks.entry(product_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
