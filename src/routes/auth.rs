use axum::Json;
use axum::extract::State;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::extractor::AuthUser;
use crate::auth::jwt::{self, Claims, TokenScope};
use crate::auth::password;
use crate::db;
use crate::error::AppError;
use crate::models::{Purpose, User};
use crate::routes::two_factor;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TwoFactorLoginRequest {
    pub challenge_token: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    TwoFactorRequired {
        two_factor_required: bool,
        challenge_token: String,
    },
    Session(AuthResponse),
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn auth_cookies(access_token: &str, refresh_token: &str) -> CookieJar {
    let access = Cookie::build(("access_token", access_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(15))
        .build();

    let refresh = Cookie::build(("refresh_token", refresh_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(7))
        .build();

    CookieJar::new().add(access).add(refresh)
}

fn clear_auth_cookies() -> CookieJar {
    let access = Cookie::build(("access_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    let refresh = Cookie::build(("refresh_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    CookieJar::new().add(access).add(refresh)
}

fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Mint an access token plus a rotating refresh token for a fully
/// authenticated user.
async fn establish_session(
    state: &SharedState,
    user: &User,
) -> Result<(CookieJar, AuthResponse), AppError> {
    let access_token = jwt::encode_token(&Claims::access(user.id), &state.config.jwt_secret)
        .map_err(AppError::Internal)?;

    let refresh = generate_refresh_token();
    let refresh_hash = hash_token(&refresh);
    db::refresh_tokens::create(
        &state.pool,
        user.id,
        &refresh_hash,
        Utc::now() + Duration::days(7),
    )
    .await?;

    let jar = auth_cookies(&access_token, &refresh);
    Ok((
        jar,
        AuthResponse {
            access_token,
            refresh_token: refresh,
        },
    ))
}

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    if req.email.is_empty() || req.password.is_empty() || req.name.is_empty() {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    if !req.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    let user = match db::users::create(&state.pool, &req.email, &pw_hash, &req.name).await {
        Ok(user) => user,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(
                "An account with that email already exists".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    // Kick off email verification out of band; registration succeeds either way.
    if state.system_mailer.is_some() {
        let state = state.clone();
        let user_id = user.id;
        let email = user.email.clone();
        tokio::spawn(async move {
            if let Err(e) = send_verification_email(&state, user_id, &email).await {
                tracing::error!("Failed to send verification email: {e}");
            }
        });
    }

    let (jar, response) = establish_session(&state, &user).await?;
    Ok((jar, Json(response)))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let user = db::users::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = password::verify(&req.password, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    // Password alone is not a session when a second factor is enrolled. Hand
    // back a pending token that only the 2FA step accepts.
    if user.totp_enabled {
        let challenge_token =
            jwt::encode_token(&Claims::two_factor(user.id), &state.config.jwt_secret)
                .map_err(AppError::Internal)?;
        return Ok((
            CookieJar::new(),
            Json(LoginResponse::TwoFactorRequired {
                two_factor_required: true,
                challenge_token,
            }),
        ));
    }

    let (jar, response) = establish_session(&state, &user).await?;
    Ok((jar, Json(LoginResponse::Session(response))))
}

pub async fn login_two_factor(
    State(state): State<SharedState>,
    Json(req): Json<TwoFactorLoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let claims = jwt::decode_scoped(
        &req.challenge_token,
        &state.config.jwt_secret,
        TokenScope::TwoFactor,
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired challenge".to_string()))?;

    let user = db::users::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired challenge".to_string()))?;

    let code = req.code.trim();
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        // Authenticator code. Attempts share the totp_enroll verify window.
        let secret = user
            .totp_secret
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("Two-factor not enrolled".to_string()))?;
        state
            .credentials
            .check_verify_rate(user.id, Purpose::TotpEnroll)
            .await?;

        let totp = two_factor::build_totp(secret, &state.config.totp_issuer, &user.email)
            .map_err(AppError::Internal)?;
        let ok = totp
            .check_current(code)
            .map_err(|e| AppError::Internal(format!("Clock error: {e}")))?;
        if !ok {
            state
                .credentials
                .record_verify_failure(user.id, Purpose::TotpEnroll)
                .await?;
            return Err(AppError::Unauthorized("Invalid code".to_string()));
        }
    } else {
        // Recovery code fallback: single use, consumed on success.
        let credential = state.credentials.validate_recovery(user.id, code).await?;
        state.credentials.consume(&credential).await?;
        tracing::info!(user = %user.id, "recovery code used for login");
    }

    let (jar, response) = establish_session(&state, &user).await?;
    Ok((jar, Json(response)))
}

pub async fn refresh(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let refresh_value = jar
        .get("refresh_token")
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let token_hash = hash_token(&refresh_value);

    let stored = db::refresh_tokens::find_by_hash(&state.pool, &token_hash)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    if stored.used {
        tracing::warn!(
            "Refresh token reuse detected for user {}. Nuking all sessions.",
            stored.user_id
        );
        db::refresh_tokens::delete_all_for_user(&state.pool, stored.user_id).await?;
        return Err(AppError::Unauthorized(
            "Refresh token reuse detected. All sessions revoked.".to_string(),
        ));
    }

    if stored.expires_at < Utc::now() {
        return Err(AppError::Unauthorized("Refresh token expired".to_string()));
    }

    db::refresh_tokens::mark_used(&state.pool, stored.id).await?;

    let user = db::users::find_by_id(&state.pool, stored.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let (new_jar, response) = establish_session(&state, &user).await?;
    Ok((new_jar, Json(response)))
}

pub async fn logout(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    if let Some(cookie) = jar.get("refresh_token") {
        let token_hash = hash_token(cookie.value());
        db::refresh_tokens::delete_by_hash(&state.pool, &token_hash).await?;
    }

    Ok((
        clear_auth_cookies(),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

pub async fn forgot_password(
    State(state): State<SharedState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    // Always 200 so the response cannot confirm whether the email exists.
    let response = Json(MessageResponse {
        message: "If that email is registered, a reset link has been sent.".to_string(),
    });

    let state = state.clone();
    tokio::spawn(async move {
        let user = match db::users::find_by_email(&state.pool, &req.email).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Password reset lookup failed: {e}");
                return;
            }
        };

        let token = match state
            .credentials
            .issue_link(user.id, Purpose::PasswordReset)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(user = %user.id, "Password reset issuance rejected: {e}");
                return;
            }
        };

        let Some(mailer) = &state.system_mailer else {
            tracing::warn!("System SMTP not configured; reset link not delivered");
            return;
        };
        let reset_url = format!("{}/auth/reset-password?token={token}", state.config.base_url);
        if let Err(e) = mailer
            .send_password_reset(&user.email, &reset_url, state.config.reset_token_ttl_mins)
            .await
        {
            tracing::error!("Failed to send password reset email: {e}");
        }
    });

    Ok(response)
}

pub async fn reset_password(
    State(state): State<SharedState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let credential = state
        .credentials
        .validate_link(Purpose::PasswordReset, &req.token)
        .await?;
    state.credentials.consume(&credential).await?;

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;
    db::users::update_password(&state.pool, credential.identity_id, &pw_hash).await?;

    // Every live session dies with the old password.
    db::refresh_tokens::delete_all_for_user(&state.pool, credential.identity_id).await?;

    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}

pub async fn request_email_verification(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if user.email_verified {
        return Err(AppError::BadRequest(
            "Email is already verified".to_string(),
        ));
    }

    send_verification_email(&state, user.id, &user.email).await?;

    Ok(Json(MessageResponse {
        message: "Verification email sent".to_string(),
    }))
}

pub async fn confirm_email_verification(
    State(state): State<SharedState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let credential = state
        .credentials
        .validate_link(Purpose::EmailVerify, &req.token)
        .await?;
    state.credentials.consume(&credential).await?;

    db::users::mark_email_verified(&state.pool, credential.identity_id).await?;

    Ok(Json(MessageResponse {
        message: "Email verified".to_string(),
    }))
}

async fn send_verification_email(
    state: &SharedState,
    user_id: uuid::Uuid,
    email: &str,
) -> Result<(), AppError> {
    let token = state
        .credentials
        .issue_link(user_id, Purpose::EmailVerify)
        .await?;

    let Some(mailer) = &state.system_mailer else {
        tracing::warn!("System SMTP not configured; verification link not delivered");
        return Ok(());
    };
    let verify_url = format!("{}/auth/verify-email?token={token}", state.config.base_url);
    mailer
        .send_email_verification(email, &verify_url)
        .await
        .map_err(AppError::Delivery)
}
