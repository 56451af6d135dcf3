use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The flow a credential is valid for. Stored as text; a secret bound to one
/// purpose can never be redeemed through another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    PasswordReset,
    EmailVerify,
    SmsEnroll,
    TotpEnroll,
    RecoveryCode,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::PasswordReset => "password_reset",
            Purpose::EmailVerify => "email_verify",
            Purpose::SmsEnroll => "sms_enroll",
            Purpose::TotpEnroll => "totp_enroll",
            Purpose::RecoveryCode => "recovery_code",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-use, time-bounded secret at rest. Only the bound hash of the
/// plaintext is stored.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub purpose: Purpose,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub superseded_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// A credential is consumable iff it was never used, never superseded by
    /// a later issuance, and has not passed its expiry.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none()
            && self.superseded_at.is_none()
            && self.expires_at.map_or(true, |exp| now < exp)
    }
}
