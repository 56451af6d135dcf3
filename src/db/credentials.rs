use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AttemptKind, Credential, Purpose};

pub async fn insert(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
    secret_hash: &str,
    metadata: Option<serde_json::Value>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Credential, sqlx::Error> {
    sqlx::query_as::<_, Credential>(
        "INSERT INTO credentials (id, identity_id, purpose, secret_hash, metadata, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(identity_id)
    .bind(purpose)
    .bind(secret_hash)
    .bind(metadata)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

/// Look up by bound hash regardless of state. The caller classifies
/// used/superseded/expired so failures can be audited precisely while the
/// HTTP response stays generic.
pub async fn find_by_hash(
    pool: &PgPool,
    purpose: Purpose,
    secret_hash: &str,
) -> Result<Option<Credential>, sqlx::Error> {
    sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials
         WHERE purpose = $1 AND secret_hash = $2
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(purpose)
    .bind(secret_hash)
    .fetch_optional(pool)
    .await
}

/// All outstanding (unused, unsuperseded) credentials for an identity and
/// purpose, newest first. Used for recovery-code verification and pending
/// TOTP enrollments, where lookup-by-hash is not possible.
pub async fn find_outstanding(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
) -> Result<Vec<Credential>, sqlx::Error> {
    sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials
         WHERE identity_id = $1 AND purpose = $2
           AND used_at IS NULL AND superseded_at IS NULL
         ORDER BY created_at DESC",
    )
    .bind(identity_id)
    .bind(purpose)
    .fetch_all(pool)
    .await
}

/// Atomic conditional mark-used. Returns false when the row was already
/// consumed or superseded; exactly one of any number of concurrent callers
/// observes true.
pub async fn mark_used(pool: &PgPool, id: Uuid, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE credentials SET used_at = $2
         WHERE id = $1 AND used_at IS NULL AND superseded_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Supersede-on-issue: kill every outstanding credential for the same
/// identity and purpose before inserting a fresh one. A stale reset link can
/// never be redeemed alongside the newly mailed one.
pub async fn supersede_outstanding(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE credentials SET superseded_at = $3
         WHERE identity_id = $1 AND purpose = $2
           AND used_at IS NULL AND superseded_at IS NULL",
    )
    .bind(identity_id)
    .bind(purpose)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_attempt(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
    kind: AttemptKind,
    success: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO credential_attempts (id, identity_id, purpose, kind, success)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::now_v7())
    .bind(identity_id)
    .bind(purpose)
    .bind(kind)
    .bind(success)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_attempts_since(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
    kind: AttemptKind,
    since: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT count(*) FROM credential_attempts
         WHERE identity_id = $1 AND purpose = $2 AND kind = $3 AND created_at >= $4",
    )
    .bind(identity_id)
    .bind(purpose)
    .bind(kind)
    .bind(since)
    .fetch_one(pool)
    .await
}

/// Timestamp of the oldest attempt still inside the window; drives the
/// retry-after hint when the limit is exceeded.
pub async fn oldest_attempt_since(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
    kind: AttemptKind,
    since: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT min(created_at) FROM credential_attempts
         WHERE identity_id = $1 AND purpose = $2 AND kind = $3 AND created_at >= $4",
    )
    .bind(identity_id)
    .bind(purpose)
    .bind(kind)
    .bind(since)
    .fetch_one(pool)
    .await
}
