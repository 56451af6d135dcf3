pub mod hashing;
pub mod rate_limit;
pub mod secret;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{AttemptKind, Credential, Purpose};

use rate_limit::RateLimit;

/// Per-purpose TTLs and rate limits. Recovery codes have no TTL; they die
/// only by consumption or by a newer batch superseding them.
#[derive(Debug, Clone)]
pub struct CredentialPolicy {
    pub reset_token_ttl: Duration,
    pub email_verify_ttl: Duration,
    pub otp_ttl: Duration,
    pub totp_enroll_ttl: Duration,
    pub issue_limit: RateLimit,
    pub verify_limit: RateLimit,
    pub recovery_batch_size: usize,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            reset_token_ttl: Duration::hours(1),
            email_verify_ttl: Duration::hours(24),
            otp_ttl: Duration::minutes(10),
            totp_enroll_ttl: Duration::minutes(15),
            issue_limit: RateLimit {
                max: 5,
                window_secs: 3600,
            },
            verify_limit: RateLimit {
                max: 10,
                window_secs: 3600,
            },
            recovery_batch_size: 10,
        }
    }
}

impl CredentialPolicy {
    fn ttl(&self, purpose: Purpose) -> Option<Duration> {
        match purpose {
            Purpose::PasswordReset => Some(self.reset_token_ttl),
            Purpose::EmailVerify => Some(self.email_verify_ttl),
            Purpose::SmsEnroll => Some(self.otp_ttl),
            Purpose::TotpEnroll => Some(self.totp_enroll_ttl),
            Purpose::RecoveryCode => None,
        }
    }
}

/// Internal error taxonomy. `NotFound`, `Expired`, `Superseded` and
/// `Malformed` are distinguished here for logging and audit, then collapsed
/// to one generic response at the HTTP boundary so a caller cannot probe
/// which case occurred.
#[derive(Debug)]
pub enum CredentialError {
    RateLimited { retry_after_secs: u64 },
    Malformed,
    NotFound,
    Expired,
    Superseded,
    AlreadyUsed,
    Hash(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::RateLimited { retry_after_secs } => {
                write!(f, "rate limit exceeded, retry after {retry_after_secs}s")
            }
            CredentialError::Malformed => write!(f, "malformed secret"),
            CredentialError::NotFound => write!(f, "no matching credential"),
            CredentialError::Expired => write!(f, "credential expired"),
            CredentialError::Superseded => write!(f, "credential superseded by a newer issuance"),
            CredentialError::AlreadyUsed => write!(f, "credential already used"),
            CredentialError::Hash(msg) => write!(f, "hashing failed: {msg}"),
            CredentialError::Database(err) => write!(f, "database error: {err}"),
        }
    }
}

impl From<sqlx::Error> for CredentialError {
    fn from(err: sqlx::Error) -> Self {
        CredentialError::Database(err)
    }
}

/// A pending TOTP enrollment: the base32 secret goes to the user's
/// authenticator app, the credential row tracks the unconfirmed enrollment.
#[derive(Debug)]
pub struct TotpEnrollment {
    pub secret_base32: String,
    pub credential: Credential,
}

/// Issues, validates and consumes every single-use secret in the system.
/// Stateless beyond the pool handle; all concurrency safety lives in the
/// store's conditional updates.
#[derive(Clone)]
pub struct CredentialManager {
    pool: PgPool,
    policy: CredentialPolicy,
}

impl CredentialManager {
    pub fn new(pool: PgPool, policy: CredentialPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    /// Issue a link token (password reset, email verification). The returned
    /// plaintext is `"{identity_id}.{secret}"`; the identity prefix lets an
    /// unauthenticated redemption recompute the bound hash. The plaintext is
    /// never stored and never logged.
    pub async fn issue_link(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
    ) -> Result<String, CredentialError> {
        let secret = secret::generate_link_secret();
        self.issue(identity_id, purpose, &secret, None).await?;
        Ok(format!("{identity_id}.{secret}"))
    }

    /// Issue a 6-digit OTP for out-of-band delivery. `metadata` carries
    /// purpose-specific context, e.g. the phone number being enrolled.
    pub async fn issue_otp(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
        metadata: serde_json::Value,
    ) -> Result<String, CredentialError> {
        let code = secret::generate_otp_code();
        self.issue(identity_id, purpose, &code, Some(metadata)).await?;
        Ok(code)
    }

    /// Begin TOTP enrollment: generate the shared secret, park it in the
    /// pending credential's metadata, and hand it back for provisioning. The
    /// enrollment is finalized by a separate confirm step that verifies a
    /// code from the authenticator and consumes this credential.
    pub async fn issue_totp_enrollment(
        &self,
        identity_id: Uuid,
    ) -> Result<TotpEnrollment, CredentialError> {
        let secret_base32 = totp_rs::Secret::generate_secret().to_encoded().to_string();
        let metadata = serde_json::json!({ "totp_secret": secret_base32 });
        let credential = self
            .issue(identity_id, Purpose::TotpEnroll, &secret_base32, Some(metadata))
            .await?;
        Ok(TotpEnrollment {
            secret_base32,
            credential,
        })
    }

    /// Generate a fresh batch of recovery codes, superseding any previous
    /// batch. Each code is Argon2id-hashed in its own row; the plaintext
    /// batch is returned exactly once.
    pub async fn issue_recovery_batch(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<String>, CredentialError> {
        self.check_rate(identity_id, Purpose::RecoveryCode, AttemptKind::Issue)
            .await?;

        let now = Utc::now();
        db::credentials::supersede_outstanding(&self.pool, identity_id, Purpose::RecoveryCode, now)
            .await?;

        let codes = secret::generate_recovery_batch(self.policy.recovery_batch_size);
        let batch_id = Uuid::now_v7();
        for code in &codes {
            let hash = hashing::hash_recovery_code(code).map_err(CredentialError::Hash)?;
            db::credentials::insert(
                &self.pool,
                identity_id,
                Purpose::RecoveryCode,
                &hash,
                Some(serde_json::json!({ "batch_id": batch_id })),
                None,
            )
            .await?;
        }

        db::credentials::insert_attempt(
            &self.pool,
            identity_id,
            Purpose::RecoveryCode,
            AttemptKind::Issue,
            true,
        )
        .await?;
        tracing::info!(identity = %identity_id, %batch_id, "issued recovery code batch");

        Ok(codes)
    }

    /// Redeem-side lookup for link tokens. The identity is recovered from
    /// the token prefix; a token that does not parse is indistinguishable
    /// from one that never existed.
    pub async fn validate_link(
        &self,
        purpose: Purpose,
        token: &str,
    ) -> Result<Credential, CredentialError> {
        let (identity, secret) = token.split_once('.').ok_or(CredentialError::Malformed)?;
        let identity_id: Uuid = identity.parse().map_err(|_| CredentialError::Malformed)?;
        self.validate_code(purpose, identity_id, secret).await
    }

    /// Validate a presented secret for a known identity without consuming
    /// it. Every failure is audited as a failed verify attempt, which feeds
    /// the rate limiter.
    pub async fn validate_code(
        &self,
        purpose: Purpose,
        identity_id: Uuid,
        presented: &str,
    ) -> Result<Credential, CredentialError> {
        self.check_rate(identity_id, purpose, AttemptKind::Verify)
            .await?;

        let hash = hashing::bound_digest(purpose, identity_id, presented);
        let found = db::credentials::find_by_hash(&self.pool, purpose, &hash).await?;

        let credential = match found {
            Some(c) => c,
            None => {
                self.record_verify_failure(identity_id, purpose).await?;
                return Err(CredentialError::NotFound);
            }
        };

        self.classify(credential).await
    }

    /// Validate a recovery code. Recovery hashes are salted Argon2id strings,
    /// so there is no lookup-by-hash; every outstanding code for the identity
    /// is verified in turn.
    pub async fn validate_recovery(
        &self,
        identity_id: Uuid,
        presented: &str,
    ) -> Result<Credential, CredentialError> {
        self.check_rate(identity_id, Purpose::RecoveryCode, AttemptKind::Verify)
            .await?;

        let normalized = secret::normalize_recovery_code(presented);
        if normalized.len() != secret::RECOVERY_CODE_LEN {
            self.record_verify_failure(identity_id, Purpose::RecoveryCode)
                .await?;
            return Err(CredentialError::Malformed);
        }

        let outstanding =
            db::credentials::find_outstanding(&self.pool, identity_id, Purpose::RecoveryCode)
                .await?;
        for credential in outstanding {
            let matches = hashing::verify_recovery_code(&normalized, &credential.secret_hash)
                .map_err(CredentialError::Hash)?;
            if matches {
                return Ok(credential);
            }
        }

        self.record_verify_failure(identity_id, Purpose::RecoveryCode)
            .await?;
        Err(CredentialError::NotFound)
    }

    /// The newest outstanding credential for an identity and purpose, e.g. a
    /// pending TOTP enrollment awaiting its confirm step.
    pub async fn pending(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
    ) -> Result<Credential, CredentialError> {
        let outstanding =
            db::credentials::find_outstanding(&self.pool, identity_id, purpose).await?;
        let credential = outstanding.into_iter().next().ok_or(CredentialError::NotFound)?;
        self.classify(credential).await
    }

    /// Terminal single-use redemption. The conditional update in the store
    /// is the sole guard against double consumption: of N concurrent callers
    /// exactly one sees success, the rest observe `AlreadyUsed`.
    pub async fn consume(&self, credential: &Credential) -> Result<(), CredentialError> {
        let consumed =
            db::credentials::mark_used(&self.pool, credential.id, Utc::now()).await?;
        if !consumed {
            self.record_verify_failure(credential.identity_id, credential.purpose)
                .await?;
            return Err(CredentialError::AlreadyUsed);
        }

        db::credentials::insert_attempt(
            &self.pool,
            credential.identity_id,
            credential.purpose,
            AttemptKind::Verify,
            true,
        )
        .await?;
        tracing::info!(
            credential = %credential.id,
            identity = %credential.identity_id,
            purpose = %credential.purpose,
            "credential consumed"
        );
        Ok(())
    }

    /// Pre-check the verify window without presenting a secret. Used by the
    /// TOTP paths, where the code is checked against the shared secret
    /// rather than a stored hash.
    pub async fn check_verify_rate(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
    ) -> Result<(), CredentialError> {
        self.check_rate(identity_id, purpose, AttemptKind::Verify).await
    }

    /// Record a failed verification that happened outside hash lookup (e.g.
    /// a wrong TOTP code), so it still counts against the verify window.
    pub async fn record_verify_failure(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
    ) -> Result<(), CredentialError> {
        db::credentials::insert_attempt(
            &self.pool,
            identity_id,
            purpose,
            AttemptKind::Verify,
            false,
        )
        .await?;
        Ok(())
    }

    /// Issue pipeline shared by links and OTPs: rate check, supersede
    /// outstanding, hash bound to (purpose, identity), insert, audit.
    async fn issue(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
        plaintext: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Credential, CredentialError> {
        self.check_rate(identity_id, purpose, AttemptKind::Issue)
            .await?;

        let now = Utc::now();
        let superseded =
            db::credentials::supersede_outstanding(&self.pool, identity_id, purpose, now).await?;
        if superseded > 0 {
            tracing::debug!(
                identity = %identity_id,
                %purpose,
                superseded,
                "superseded outstanding credentials"
            );
        }

        let hash = hashing::bound_digest(purpose, identity_id, plaintext);
        let expires_at = self.policy.ttl(purpose).map(|ttl| now + ttl);
        let credential = db::credentials::insert(
            &self.pool,
            identity_id,
            purpose,
            &hash,
            metadata,
            expires_at,
        )
        .await?;

        db::credentials::insert_attempt(
            &self.pool,
            identity_id,
            purpose,
            AttemptKind::Issue,
            true,
        )
        .await?;
        tracing::info!(
            credential = %credential.id,
            identity = %identity_id,
            %purpose,
            "credential issued"
        );

        Ok(credential)
    }

    async fn check_rate(
        &self,
        identity_id: Uuid,
        purpose: Purpose,
        kind: AttemptKind,
    ) -> Result<(), CredentialError> {
        let limit = match kind {
            AttemptKind::Issue => self.policy.issue_limit,
            AttemptKind::Verify => self.policy.verify_limit,
        };
        match rate_limit::check(&self.pool, identity_id, purpose, kind, limit).await? {
            Ok(()) => Ok(()),
            Err(exceeded) => {
                tracing::warn!(
                    identity = %identity_id,
                    %purpose,
                    kind = kind.as_str(),
                    retry_after = exceeded.retry_after_secs,
                    "rate limit exceeded"
                );
                Err(CredentialError::RateLimited {
                    retry_after_secs: exceeded.retry_after_secs,
                })
            }
        }
    }

    /// Classify a found row into the internal taxonomy. A dead row records a
    /// failed verify attempt before the error is returned.
    async fn classify(&self, credential: Credential) -> Result<Credential, CredentialError> {
        let error = if credential.used_at.is_some() {
            Some(CredentialError::AlreadyUsed)
        } else if credential.superseded_at.is_some() {
            Some(CredentialError::Superseded)
        } else if credential
            .expires_at
            .is_some_and(|exp| Utc::now() >= exp)
        {
            Some(CredentialError::Expired)
        } else {
            None
        };

        match error {
            None => Ok(credential),
            Some(err) => {
                tracing::debug!(
                    credential = %credential.id,
                    identity = %credential.identity_id,
                    purpose = %credential.purpose,
                    %err,
                    "credential validation failed"
                );
                self.record_verify_failure(credential.identity_id, credential.purpose)
                    .await?;
                Err(err)
            }
        }
    }
}
