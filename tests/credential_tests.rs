mod common;

use futures_util::future::join_all;
use reqwest::StatusCode;
use serde_json::json;

use credo::credential::{CredentialError, CredentialManager, CredentialPolicy};
use credo::models::Purpose;

fn manager(app: &common::TestApp) -> CredentialManager {
    CredentialManager::new(app.pool.clone(), CredentialPolicy::default())
}

// ── Health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    common::cleanup(app).await;
}

// ── Password reset ──────────────────────────────────────────────

#[tokio::test]
async fn password_reset_end_to_end() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let token = manager(&app)
        .issue_link(user, Purpose::PasswordReset)
        .await
        .unwrap();

    let (_, status) = app
        .post(
            "/api/v1/auth/reset-password",
            &json!({ "token": token, "password": "newpassword99" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // New password works, old one does not.
    let (_, status) = app.login("user@test.com", "newpassword99").await;
    assert_eq!(status, StatusCode::OK);
    let (_, status) = app.login("user@test.com", "password123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Replaying the consumed token is reported as already used.
    let (body, status) = app
        .post(
            "/api/v1/auth/reset-password",
            &json!({ "token": token, "password": "anotherpass1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already been used"));

    common::cleanup(app).await;
}

#[tokio::test]
async fn expired_reset_token_is_rejected_generically() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let token = manager(&app)
        .issue_link(user, Purpose::PasswordReset)
        .await
        .unwrap();
    app.expire_credentials(user, "password_reset").await;

    let (body, status) = app
        .post(
            "/api/v1/auth/reset-password",
            &json!({ "token": token, "password": "newpassword99" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // Expired is indistinguishable from never-existed.
    assert_eq!(body["error"].as_str().unwrap(), "Invalid or expired code");

    common::cleanup(app).await;
}

#[tokio::test]
async fn newer_issuance_supersedes_older_token() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let mgr = manager(&app);
    let first = mgr.issue_link(user, Purpose::PasswordReset).await.unwrap();
    let second = mgr.issue_link(user, Purpose::PasswordReset).await.unwrap();

    let (_, status) = app
        .post(
            "/api/v1/auth/reset-password",
            &json!({ "token": first, "password": "newpassword99" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status) = app
        .post(
            "/api/v1/auth/reset-password",
            &json!({ "token": second, "password": "newpassword99" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

#[tokio::test]
async fn forgot_password_never_reveals_account_existence() {
    let app = common::spawn_app().await;
    app.bootstrap().await;

    let (known, status_known) = app
        .post(
            "/api/v1/auth/forgot-password",
            &json!({ "email": "user@test.com" }),
        )
        .await;
    let (unknown, status_unknown) = app
        .post(
            "/api/v1/auth/forgot-password",
            &json!({ "email": "nobody@test.com" }),
        )
        .await;

    assert_eq!(status_known, StatusCode::OK);
    assert_eq!(status_unknown, StatusCode::OK);
    assert_eq!(known["message"], unknown["message"]);

    common::cleanup(app).await;
}

// ── Email verification ──────────────────────────────────────────

#[tokio::test]
async fn email_verification_end_to_end() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let token = manager(&app)
        .issue_link(user, Purpose::EmailVerify)
        .await
        .unwrap();

    let (_, status) = app
        .post("/api/v1/auth/verify-email/confirm", &json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let verified: bool =
        sqlx::query_scalar("SELECT email_verified FROM users WHERE id = $1")
            .bind(user)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(verified);

    let (_, status) = app
        .post("/api/v1/auth/verify-email/confirm", &json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn token_bound_to_one_purpose_rejected_by_another() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let reset_token = manager(&app)
        .issue_link(user, Purpose::PasswordReset)
        .await
        .unwrap();

    // A live reset token presented to the email-verify flow must look like
    // it never existed.
    let (_, status) = app
        .post(
            "/api/v1/auth/verify-email/confirm",
            &json!({ "token": reset_token }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

// ── Single-use under concurrency ────────────────────────────────

#[tokio::test]
async fn concurrent_consume_has_exactly_one_winner() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let mgr = manager(&app);
    let token = mgr.issue_link(user, Purpose::PasswordReset).await.unwrap();
    let credential = mgr
        .validate_link(Purpose::PasswordReset, &token)
        .await
        .unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let mgr = mgr.clone();
            let cred = credential.clone();
            tokio::spawn(async move { mgr.consume(&cred).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent consume may win");
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(CredentialError::AlreadyUsed)));
    }

    common::cleanup(app).await;
}

// ── SMS OTP enrollment ──────────────────────────────────────────

#[tokio::test]
async fn sms_otp_confirm_consumes_and_sets_phone() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    // Issue directly so the plaintext code is in hand (no gateway in tests).
    let code = manager(&app)
        .issue_otp(user, Purpose::SmsEnroll, json!({ "phone": "+15550100" }))
        .await
        .unwrap();

    let (_, status) = app
        .post_auth("/api/v1/2fa/sms/confirm", &access, &json!({ "code": "000000" }))
        .await;
    // Overwhelmingly likely the wrong guess; skip the assertion if the RNG
    // actually produced 000000.
    if code != "000000" {
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (_, status) = app
        .post_auth("/api/v1/2fa/sms/confirm", &access, &json!({ "code": code }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (phone, phone_verified): (Option<String>, bool) =
        sqlx::query_as("SELECT phone, phone_verified FROM users WHERE id = $1")
            .bind(user)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(phone.as_deref(), Some("+15550100"));
    assert!(phone_verified);

    // Replay of a consumed code.
    let (_, status) = app
        .post_auth("/api/v1/2fa/sms/confirm", &access, &json!({ "code": code }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn expired_otp_is_invalid() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    let code = manager(&app)
        .issue_otp(user, Purpose::SmsEnroll, json!({ "phone": "+15550100" }))
        .await
        .unwrap();
    app.expire_credentials(user, "sms_enroll").await;

    let (body, status) = app
        .post_auth("/api/v1/2fa/sms/confirm", &access, &json!({ "code": code }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str().unwrap(), "Invalid or expired code");

    common::cleanup(app).await;
}

// ── Rate limiting ───────────────────────────────────────────────

#[tokio::test]
async fn sixth_sms_issue_in_window_is_rate_limited() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;
    let user = app.user_id("user@test.com").await;

    for _ in 0..5 {
        let (_, status) = app
            .post_auth(
                "/api/v1/2fa/sms/enroll",
                &access,
                &json!({ "phone": "+15550100" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (body, status) = app
        .post_auth(
            "/api/v1/2fa/sms/enroll",
            &access,
            &json!({ "phone": "+15550100" }),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["retry_after_secs"].as_u64().unwrap() > 0);

    // Once the window drains, issuance is allowed again.
    app.drain_attempt_window(user, "sms_enroll").await;
    let (_, status) = app
        .post_auth(
            "/api/v1/2fa/sms/enroll",
            &access,
            &json!({ "phone": "+15550100" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

#[tokio::test]
async fn repeated_bad_codes_exhaust_the_verify_window() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;

    for _ in 0..10 {
        let (_, status) = app
            .post_auth(
                "/api/v1/2fa/sms/confirm",
                &access,
                &json!({ "code": "999999" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (body, status) = app
        .post_auth(
            "/api/v1/2fa/sms/confirm",
            &access,
            &json!({ "code": "999999" }),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["retry_after_secs"].as_u64().unwrap() > 0);

    common::cleanup(app).await;
}

// ── TOTP enrollment and 2FA login ───────────────────────────────

async fn enroll_totp(app: &common::TestApp, access: &str) -> String {
    let (body, status) = app
        .post_auth("/api/v1/2fa/totp/enroll", access, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let secret = body["secret"].as_str().unwrap().to_string();
    assert!(body["otpauth_url"].as_str().unwrap().starts_with("otpauth://"));

    let code = current_totp_code(&secret);
    let (body, status) = app
        .post_auth("/api/v1/2fa/totp/confirm", access, &json!({ "code": code }))
        .await;
    assert_eq!(status, StatusCode::OK, "totp confirm failed: {body}");
    secret
}

fn current_totp_code(secret_base32: &str) -> String {
    let secret = totp_rs::Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .unwrap();
    let totp = totp_rs::TOTP::new(
        totp_rs::Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some("Credo Test".to_string()),
        "user@test.com".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

#[tokio::test]
async fn totp_enrollment_gates_login_behind_second_factor() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;

    let secret = enroll_totp(&app, &access).await;

    // Password alone now yields only a challenge.
    let (body, status) = app.login("user@test.com", "password123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["two_factor_required"], json!(true));
    let challenge = body["challenge_token"].as_str().unwrap().to_string();
    assert!(body.get("access_token").is_none());

    // Wrong code fails, correct code completes the session.
    let (_, status) = app
        .post(
            "/api/v1/auth/login/2fa",
            &json!({ "challenge_token": challenge, "code": "000000" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let code = current_totp_code(&secret);
    let (body, status) = app
        .post(
            "/api/v1/auth/login/2fa",
            &json!({ "challenge_token": challenge, "code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    common::cleanup(app).await;
}

#[tokio::test]
async fn challenge_token_is_not_an_access_token() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;
    enroll_totp(&app, &access).await;

    let (body, _) = app.login("user@test.com", "password123").await;
    let challenge = body["challenge_token"].as_str().unwrap();

    // The pending token must not pass authenticated endpoints.
    let (_, status) = app
        .post_auth("/api/v1/2fa/totp/enroll", challenge, &json!({}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

// ── Recovery codes ──────────────────────────────────────────────

#[tokio::test]
async fn recovery_code_is_single_use_and_batch_superseding() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;
    enroll_totp(&app, &access).await;

    let (body, status) = app
        .post_auth("/api/v1/2fa/recovery-codes", &access, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<String> = body["codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes.len(), 10);
    let unique: std::collections::HashSet<_> = codes.iter().collect();
    assert_eq!(unique.len(), 10);

    // A recovery code completes a 2FA login once.
    let (body, _) = app.login("user@test.com", "password123").await;
    let challenge = body["challenge_token"].as_str().unwrap().to_string();
    let (body, status) = app
        .post(
            "/api/v1/auth/login/2fa",
            &json!({ "challenge_token": challenge, "code": codes[0] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "recovery login failed: {body}");

    // Spent code no longer matches anything.
    let (body, _) = app.login("user@test.com", "password123").await;
    let challenge = body["challenge_token"].as_str().unwrap().to_string();
    let (_, status) = app
        .post(
            "/api/v1/auth/login/2fa",
            &json!({ "challenge_token": challenge, "code": codes[0] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A fresh batch kills the remaining codes of the old one.
    let (body, status) = app
        .post_auth("/api/v1/2fa/recovery-codes", &access, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["codes"].as_array().unwrap().len(), 10);

    let (body, _) = app.login("user@test.com", "password123").await;
    let challenge = body["challenge_token"].as_str().unwrap().to_string();
    let (_, status) = app
        .post(
            "/api/v1/auth/login/2fa",
            &json!({ "challenge_token": challenge, "code": codes[1] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

#[tokio::test]
async fn recovery_codes_require_an_enrolled_second_factor() {
    let app = common::spawn_app().await;
    let access = app.bootstrap().await;

    let (_, status) = app
        .post_auth("/api/v1/2fa/recovery-codes", &access, &json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

// ── Session refresh ─────────────────────────────────────────────

#[tokio::test]
async fn refresh_token_reuse_revokes_all_sessions() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let (login_body, _) = app.login("user@test.com", "password123").await;
    let refresh = login_body["refresh_token"].as_str().unwrap();

    let resp1 = app
        .client
        .post(app.url("/api/v1/auth/refresh"))
        .header("cookie", format!("refresh_token={refresh}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp1.status(), StatusCode::OK);
    let body: serde_json::Value = resp1.json().await.unwrap();
    let rotated = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh);

    // Replaying the rotated-out token nukes every session, including the
    // fresh one.
    let resp2 = app
        .client
        .post(app.url("/api/v1/auth/refresh"))
        .header("cookie", format!("refresh_token={refresh}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp2.status(), StatusCode::UNAUTHORIZED);

    let resp3 = app
        .client
        .post(app.url("/api/v1/auth/refresh"))
        .header("cookie", format!("refresh_token={rotated}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp3.status(), StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

#[tokio::test]
async fn password_reset_revokes_refresh_tokens() {
    let app = common::spawn_app().await;
    app.bootstrap().await;
    let user = app.user_id("user@test.com").await;
    let (login_body, _) = app.login("user@test.com", "password123").await;
    let refresh = login_body["refresh_token"].as_str().unwrap();

    let token = manager(&app)
        .issue_link(user, Purpose::PasswordReset)
        .await
        .unwrap();
    let (_, status) = app
        .post(
            "/api/v1/auth/reset-password",
            &json!({ "token": token, "password": "newpassword99" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let resp = app
        .client
        .post(app.url("/api/v1/auth/refresh"))
        .header("cookie", format!("refresh_token={refresh}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}
