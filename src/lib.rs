pub mod client;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use crate::services::notification_service::NotificationPort;
use crate::services::session_service::{SessionService, SessionSettings};
use crate::store::SessionStore;
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct AppState<S> {
    pub sessions: SessionService<S>,
}

impl<S: SessionStore> AppState<S> {
    pub fn new(
        store: S,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: SessionService::new(store, notifier, clock, settings),
        }
    }
}
