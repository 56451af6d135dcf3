use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::models::Purpose;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct SmsEnrollRequest {
    pub phone: String,
}

#[derive(Deserialize)]
pub struct ConfirmCodeRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct TotpEnrollResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Serialize)]
pub struct RecoveryCodesResponse {
    pub codes: Vec<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// RFC 6238 defaults: SHA-1, 6 digits, 30-second step, one step of skew.
pub fn build_totp(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP, String> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| format!("Invalid TOTP secret: {e:?}"))?;
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| format!("TOTP init failed: {e}"))
}

/// Start SMS enrollment: issue a code bound to the phone number and text it
/// out. The number is only written to the user once the code comes back.
pub async fn sms_enroll(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<SmsEnrollRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let phone = req.phone.trim();
    if phone.is_empty() || !phone.starts_with('+') || phone.len() < 8 {
        return Err(AppError::BadRequest(
            "Phone number must be in international format".to_string(),
        ));
    }

    let code = state
        .credentials
        .issue_otp(
            auth.user_id,
            Purpose::SmsEnroll,
            serde_json::json!({ "phone": phone }),
        )
        .await?;

    match &state.sms_sender {
        Some(sender) => {
            sender
                .send(phone, &format!("Your Credo verification code is {code}"))
                .await
                .map_err(AppError::Delivery)?;
        }
        None => tracing::warn!("SMS gateway not configured; enrollment code not delivered"),
    }

    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

pub async fn sms_confirm(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<ConfirmCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let credential = state
        .credentials
        .validate_code(Purpose::SmsEnroll, auth.user_id, req.code.trim())
        .await?;
    state.credentials.consume(&credential).await?;

    let phone = credential
        .metadata
        .as_ref()
        .and_then(|m| m.get("phone"))
        .and_then(|p| p.as_str())
        .ok_or_else(|| AppError::Internal("SMS credential missing phone metadata".to_string()))?;
    db::users::set_verified_phone(&state.pool, auth.user_id, phone).await?;

    Ok(Json(MessageResponse {
        message: "Phone number verified".to_string(),
    }))
}

/// Start TOTP enrollment. The shared secret is parked in the pending
/// credential until the confirm step proves the authenticator has it.
pub async fn totp_enroll(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<TotpEnrollResponse>, AppError> {
    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let enrollment = state.credentials.issue_totp_enrollment(user.id).await?;
    let totp = build_totp(
        &enrollment.secret_base32,
        &state.config.totp_issuer,
        &user.email,
    )
    .map_err(AppError::Internal)?;

    Ok(Json(TotpEnrollResponse {
        secret: enrollment.secret_base32,
        otpauth_url: totp.get_url(),
    }))
}

pub async fn totp_confirm(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<ConfirmCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    state
        .credentials
        .check_verify_rate(user.id, Purpose::TotpEnroll)
        .await?;

    let pending = state.credentials.pending(user.id, Purpose::TotpEnroll).await?;
    let secret = pending
        .metadata
        .as_ref()
        .and_then(|m| m.get("totp_secret"))
        .and_then(|s| s.as_str())
        .ok_or_else(|| AppError::Internal("Enrollment missing TOTP secret".to_string()))?
        .to_string();

    let totp =
        build_totp(&secret, &state.config.totp_issuer, &user.email).map_err(AppError::Internal)?;
    let ok = totp
        .check_current(req.code.trim())
        .map_err(|e| AppError::Internal(format!("Clock error: {e}")))?;
    if !ok {
        state
            .credentials
            .record_verify_failure(user.id, Purpose::TotpEnroll)
            .await?;
        return Err(AppError::InvalidOrExpired);
    }

    // Commit step: consume the pending enrollment, then persist the secret.
    state.credentials.consume(&pending).await?;
    db::users::enable_totp(&state.pool, user.id, &secret).await?;

    Ok(Json(MessageResponse {
        message: "Two-factor authentication enabled".to_string(),
    }))
}

/// Regenerate the recovery batch. Plaintext codes are returned exactly once;
/// any previous batch is superseded wholesale.
pub async fn recovery_codes(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<RecoveryCodesResponse>, AppError> {
    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !user.totp_enabled && !user.phone_verified {
        return Err(AppError::BadRequest(
            "Enable a second factor before generating recovery codes".to_string(),
        ));
    }

    let codes = state.credentials.issue_recovery_batch(user.id).await?;
    Ok(Json(RecoveryCodesResponse { codes }))
}
