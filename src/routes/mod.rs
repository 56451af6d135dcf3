pub mod auth;
pub mod two_factor;

use axum::Router;
use axum::routing::post;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Sessions
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/login/2fa", post(auth::login_two_factor))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        // Password reset
        .route("/api/v1/auth/forgot-password", post(auth::forgot_password))
        .route("/api/v1/auth/reset-password", post(auth::reset_password))
        // Email verification
        .route(
            "/api/v1/auth/verify-email/request",
            post(auth::request_email_verification),
        )
        .route(
            "/api/v1/auth/verify-email/confirm",
            post(auth::confirm_email_verification),
        )
        // Second factor enrollment
        .route("/api/v1/2fa/sms/enroll", post(two_factor::sms_enroll))
        .route("/api/v1/2fa/sms/confirm", post(two_factor::sms_confirm))
        .route("/api/v1/2fa/totp/enroll", post(two_factor::totp_enroll))
        .route("/api/v1/2fa/totp/confirm", post(two_factor::totp_confirm))
        .route(
            "/api/v1/2fa/recovery-codes",
            post(two_factor::recovery_codes),
        )
}
