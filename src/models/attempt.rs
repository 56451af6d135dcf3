use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether an attempt was an issuance (send a code, mint a link) or a
/// verification (redeem one). The two are rate limited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Issue,
    Verify,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptKind::Issue => "issue",
            AttemptKind::Verify => "verify",
        }
    }
}

/// Append-only audit record of every issuance and redemption attempt. Doubles
/// as the source the sliding-window rate limiter counts over.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CredentialAttempt {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub purpose: crate::models::Purpose,
    pub kind: AttemptKind,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}
