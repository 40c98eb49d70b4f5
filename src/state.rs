use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::notifications::Mailer;
use crate::services::payments::PaymentProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub payments: Box<dyn PaymentProvider>,
    pub mailer: Box<dyn Mailer>,
}

impl AppState {
    /// Locks the shared connection. A panic in another holder leaves SQLite
    /// itself consistent, so a poisoned lock is still usable.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
