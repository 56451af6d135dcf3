pub mod auth;
pub mod config;
pub mod credential;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod routes;
pub mod sms;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use sqlx::PgPool;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Config;
use crate::credential::CredentialManager;
use crate::email::SystemMailer;
use crate::sms::{HttpSmsGateway, SmsSender};
use crate::state::{AppState, SharedState};

pub fn build_app(pool: PgPool, config: Config) -> Router {
    let system_mailer = config.smtp.as_ref().and_then(|smtp| {
        match SystemMailer::new(smtp) {
            Ok(mailer) => {
                tracing::info!("System SMTP configured");
                Some(Arc::new(mailer))
            }
            Err(e) => {
                tracing::warn!("System SMTP not available: {e}");
                None
            }
        }
    });

    let sms_sender: Option<Arc<dyn SmsSender>> = config.sms.as_ref().and_then(|sms| {
        match HttpSmsGateway::new(sms) {
            Ok(gateway) => {
                tracing::info!("SMS gateway configured");
                Some(Arc::new(gateway) as Arc<dyn SmsSender>)
            }
            Err(e) => {
                tracing::warn!("SMS gateway not available: {e}");
                None
            }
        }
    });

    let credentials = CredentialManager::new(pool.clone(), config.credential_policy());

    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        credentials,
        system_mailer,
        sms_sender,
    });

    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
