use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{AttemptKind, Purpose};

/// Trailing-window limit: at most `max` attempts per (identity, purpose,
/// kind) within the last `window_secs` seconds.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max: u32,
    pub window_secs: u64,
}

/// Returned when the window is full. `retry_after_secs` is the time until
/// the oldest attempt in the window falls out of it.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

/// Count attempts in the trailing window and reject when the limit is hit.
/// Read-then-decide: two simultaneous requests may both pass the count. That
/// race is accepted (the worst case is one extra SMS or email, and the
/// window keeps filling either way).
pub async fn check(
    pool: &PgPool,
    identity_id: Uuid,
    purpose: Purpose,
    kind: AttemptKind,
    limit: RateLimit,
) -> Result<Result<(), RateLimitExceeded>, sqlx::Error> {
    let now = Utc::now();
    let since = now - Duration::seconds(limit.window_secs as i64);

    let count =
        db::credentials::count_attempts_since(pool, identity_id, purpose, kind, since).await?;
    if count < i64::from(limit.max) {
        return Ok(Ok(()));
    }

    let oldest = db::credentials::oldest_attempt_since(pool, identity_id, purpose, kind, since)
        .await?
        .unwrap_or(now);

    Ok(Err(RateLimitExceeded {
        retry_after_secs: retry_after_secs(oldest, limit.window_secs, now),
    }))
}

/// Seconds until `oldest` ages past the window. Clamped to at least 1 so a
/// 429 always carries a positive hint.
fn retry_after_secs(oldest: DateTime<Utc>, window_secs: u64, now: DateTime<Utc>) -> u64 {
    let expires = oldest + Duration::seconds(window_secs as i64);
    (expires - now).num_seconds().max(1) as u64
}
