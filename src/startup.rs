use crate::cors::cors;
use crate::db::TallyStore;
use crate::error::PollError;
use crate::polls::{get_poll, vote_on_poll};
use crate::ws::{Broadcaster, Registry, SubscriptionSettings, poll_updates_ws};
use axum::{
    Router,
    extract::Extension,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tower_http::trace::TraceLayer;
use tracing::error;

/// Everything the handlers share. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TallyStore>,
    pub registry: Registry,
    pub broadcaster: Broadcaster,
    pub question: Arc<str>,
    pub subscription: SubscriptionSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TallyStore>,
        question: &str,
        subscription: SubscriptionSettings,
    ) -> Self {
        let question: Arc<str> = question.into();
        let registry = Registry::new();
        // Covers waiting behind one in-flight write plus our own.
        let delivery_timeout = subscription.send_timeout * 2;
        let broadcaster = Broadcaster::new(
            store.clone(),
            registry.clone(),
            question.clone(),
            delivery_timeout,
        );

        AppState {
            store,
            registry,
            broadcaster,
            question,
            subscription,
        }
    }

    pub fn spawn_health_check(&self, period: Duration) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = store.ping().await {
                    error!("Tally store health check failed: {}", e);
                }
            }
        });
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/poll", get(get_poll))
        .route("/api/poll/vote", post(vote_on_poll))
        .route("/ws/poll", get(poll_updates_ws))
        .fallback(handler_404)
        .layer(Extension(app_state))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
}

async fn handler_404() -> PollError {
    PollError::NotFound
}
