//! Scan job store
//!
//! Key-value persistence for scan job records: key = job id, value =
//! the JSON-encoded `ScanJob`, plus a bounded TTL as the safety net
//! against orphaned records. Expired rows are treated as absent
//! everywhere, so callers never observe a stale job.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::ScanJob;
use shelfscan_common::{Error, Result};

fn expiry(ttl_secs: u64) -> String {
    (Utc::now() + Duration::seconds(ttl_secs as i64)).to_rfc3339()
}

fn is_expired(expires_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(t) => t.with_timezone(&Utc) <= Utc::now(),
        // Unparseable expiry is treated as expired rather than immortal
        Err(_) => true,
    }
}

/// Insert a new job record with a fresh TTL
pub async fn create_job(pool: &SqlitePool, job: &ScanJob, ttl_secs: u64) -> Result<()> {
    let record = serde_json::to_string(job)
        .map_err(|e| Error::Internal(format!("Failed to serialize job record: {}", e)))?;

    sqlx::query("INSERT INTO scan_jobs (job_id, record, expires_at) VALUES (?, ?, ?)")
        .bind(job.job_id.to_string())
        .bind(&record)
        .bind(expiry(ttl_secs))
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether a job id is already present (expired rows don't count)
pub async fn job_exists(pool: &SqlitePool, job_id: Uuid) -> Result<bool> {
    Ok(load_job(pool, job_id).await?.is_some())
}

/// Load a job record; expired rows are lazily deleted and reported absent
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<ScanJob>> {
    let row = sqlx::query("SELECT record, expires_at FROM scan_jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expires_at: String = row.get("expires_at");
    if is_expired(&expires_at) {
        delete_job(pool, job_id).await?;
        return Ok(None);
    }

    let record: String = row.get("record");
    let job = serde_json::from_str(&record)
        .map_err(|e| Error::Internal(format!("Failed to deserialize job record: {}", e)))?;

    Ok(Some(job))
}

/// Shallow-merge a JSON patch into a job record, refreshing its TTL
///
/// Returns the updated record, or `None` when the job is absent or
/// expired. Absence is a valid outcome the caller tolerates silently
/// (the job may have expired between writes), never an error. The
/// `lastUpdated` field is stamped on every merge.
pub async fn merge_job(
    pool: &SqlitePool,
    job_id: Uuid,
    patch: serde_json::Value,
    ttl_secs: u64,
) -> Result<Option<ScanJob>> {
    let Some(current) = load_job(pool, job_id).await? else {
        return Ok(None);
    };

    let mut merged = serde_json::to_value(&current)
        .map_err(|e| Error::Internal(format!("Failed to serialize job record: {}", e)))?;

    if let (Some(target), Some(fields)) = (merged.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
        target.insert(
            "lastUpdated".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
    }

    let job: ScanJob = serde_json::from_value(merged)
        .map_err(|e| Error::Internal(format!("Failed to deserialize merged record: {}", e)))?;

    let record = serde_json::to_string(&job)
        .map_err(|e| Error::Internal(format!("Failed to serialize job record: {}", e)))?;

    sqlx::query("UPDATE scan_jobs SET record = ?, expires_at = ? WHERE job_id = ?")
        .bind(&record)
        .bind(expiry(ttl_secs))
        .bind(job_id.to_string())
        .execute(pool)
        .await?;

    Ok(Some(job))
}

/// Hard-delete a job record; deleting an absent row is a no-op
pub async fn delete_job(pool: &SqlitePool, job_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM scan_jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Hard-delete all expired rows, returning the count removed
///
/// Run at startup and on a background interval; load_job already treats
/// expired rows as absent, this just reclaims the space.
pub async fn purge_expired(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query("DELETE FROM scan_jobs WHERE expires_at <= ?")
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    let purged = result.rows_affected() as usize;
    if purged > 0 {
        tracing::info!(purged, "Purged expired scan jobs");
    }

    Ok(purged)
}
