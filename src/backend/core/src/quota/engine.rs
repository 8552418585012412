//! Lua-script atomic increment-with-limit, the keyword-count DB quota, the
//! hourly durable sync, and the monthly alert throttle.
//!
//! Modeled on the conservation-law checks in `contracts::AgentContract`
//! (record-usage-then-compare-to-limit, transition to an exceeded state on
//! overflow) but moved from in-memory per-task budgets to Redis-backed
//! per-tenant-per-month counters, since quota state must survive process
//! restarts and be shared across every worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use redis::{AsyncCommands, Script};
use tracing::warn;

use crate::db::Database;
use crate::error::Result;

/// Quota dimensions tracked on the Redis hot path. Keyword count is checked
/// directly against Postgres instead (see `QuotaEngine::check_keyword_count`)
/// since it never needs sub-millisecond latency and already lives in a table
/// the project/keyword endpoints touch on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    ApiCalls,
    SerpJobs,
    CrawlJobs,
}

impl QuotaKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::ApiCalls => "api_calls",
            Self::SerpJobs => "serp_jobs",
            Self::CrawlJobs => "crawl_jobs",
        }
    }
}

/// Result of a quota check: whether the increment was allowed, the usage
/// total it was measured against, and whether this check just crossed the
/// monthly alert threshold and should notify the tenant.
#[derive(Debug, Clone)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub used: i64,
    pub limit: i64,
    pub should_alert: bool,
}

const TTL_SECONDS: i64 = 60 * 24 * 60 * 60; // 60 days, per spec §4.4

/// Atomically: INCRBY, and if the result exceeds a nonzero limit, undo the
/// increment and report rejection. `limit <= 0` means unlimited (no cap
/// applied, but the counter still increments and still expires).
const INCREMENT_WITH_LIMIT: &str = r#"
local current = redis.call('INCRBY', KEYS[1], ARGV[1])
local limit = tonumber(ARGV[2])
if limit > 0 and current > limit then
    redis.call('DECRBY', KEYS[1], ARGV[1])
    return {current - tonumber(ARGV[1]), 0}
end
if current == tonumber(ARGV[1]) then
    redis.call('EXPIRE', KEYS[1], ARGV[3])
end
return {current, 1}
"#;

pub struct QuotaEngine {
    redis: redis::aio::ConnectionManager,
    db: Database,
    syncing: Arc<AtomicBool>,
}

impl QuotaEngine {
    pub async fn connect(redis_url: &str, db: Database) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { redis, db, syncing: Arc::new(AtomicBool::new(false)) })
    }

    fn period_now() -> String {
        let now = Utc::now();
        format!("{:04}-{:02}", now.year(), now.month())
    }

    fn redis_key(tenant_id: &str, period: &str, kind: QuotaKind) -> String {
        format!("quota:{tenant_id}:{period}:{}", kind.as_str())
    }

    /// Parse a `quota:<tenantId>:<period>:<kind>` key back into its parts,
    /// as surfaced by the `quota:*` scan in `sync_all`.
    fn parse_key(key: &str) -> Option<(String, String, QuotaKind)> {
        let mut parts = key.splitn(4, ':');
        if parts.next()? != "quota" {
            return None;
        }
        let tenant_id = parts.next()?.to_string();
        let period = parts.next()?.to_string();
        let kind = match parts.next()? {
            "api_calls" => QuotaKind::ApiCalls,
            "serp_jobs" => QuotaKind::SerpJobs,
            "crawl_jobs" => QuotaKind::CrawlJobs,
            _ => return None,
        };
        Some((tenant_id, period, kind))
    }

    /// Check-and-increment one quota dimension by `amount`. Fails open (logs
    /// and reports `allowed = true`) if Redis is unreachable, per spec §7's
    /// infrastructure-failure handling for the quota subsystem.
    pub async fn check(&self, tenant_id: &str, kind: QuotaKind, amount: i64, limit: i64) -> QuotaCheck {
        let period = Self::period_now();
        let key = Self::redis_key(tenant_id, &period, kind);

        let mut conn = self.redis.clone();
        let result: redis::RedisResult<(i64, i64)> = Script::new(INCREMENT_WITH_LIMIT)
            .key(&key)
            .arg(amount)
            .arg(limit)
            .arg(TTL_SECONDS)
            .invoke_async(&mut conn)
            .await;

        let (used, allowed_flag) = match result {
            Ok(pair) => pair,
            Err(err) => {
                warn!(tenant_id = %tenant_id, kind = kind.as_str(), error = %err, "quota check failed open: redis unreachable");
                return QuotaCheck {
                    allowed: true,
                    used: 0,
                    limit,
                    should_alert: false,
                };
            }
        };

        let allowed = allowed_flag == 1;
        let should_alert = !allowed
            && self
                .db
                .try_claim_quota_alert(tenant_id, &period)
                .await
                .unwrap_or(false);

        QuotaCheck {
            allowed,
            used,
            limit,
            should_alert,
        }
    }

    /// Keyword count has no Redis mirror; it's cheap enough to check directly
    /// against the table the write is about to land in (spec §4.4).
    pub async fn check_keyword_count(
        &self,
        ctx: &crate::db::tenant::TenantContext,
        limit: i64,
    ) -> Result<QuotaCheck> {
        let used = self.db.count_keywords(ctx).await?;
        Ok(QuotaCheck {
            allowed: limit <= 0 || used < limit,
            used,
            limit,
            should_alert: false,
        })
    }

    /// Hourly reconciliation (spec §4.4): scans every `quota:*` key rather
    /// than requiring a pre-known tenant list, groups the per-tenant-per-
    /// period counters, and merges each into `tenant_usage` with `GREATEST`
    /// so the durable table never loses ground if Redis gets evicted or
    /// restarted. A process-local flag suppresses overlapping runs if a
    /// sweep is still in flight when the next tick fires; partial sweeps
    /// are otherwise safe since every merge is an idempotent max.
    pub async fn sync_all(&self) -> Result<()> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            warn!("quota usage sync already running, skipping this tick");
            return Ok(());
        }
        let result = self.sync_all_inner().await;
        self.syncing.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_all_inner(&self) -> Result<()> {
        let mut conn = self.redis.clone();

        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match("quota:*").await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        drop(iter);

        let mut totals: HashMap<(String, String), [i64; 3]> = HashMap::new();
        for key in &keys {
            let Some((tenant_id, period, kind)) = Self::parse_key(key) else {
                continue;
            };
            let value: i64 = conn.get(key).await.unwrap_or(0);
            let entry = totals.entry((tenant_id, period)).or_insert([0, 0, 0]);
            match kind {
                QuotaKind::ApiCalls => entry[0] = value,
                QuotaKind::SerpJobs => entry[1] = value,
                QuotaKind::CrawlJobs => entry[2] = value,
            }
        }

        for ((tenant_id, period), [api_calls, serp_jobs, crawl_jobs]) in totals {
            if let Err(err) = self
                .db
                .sync_tenant_usage_max(&tenant_id, &period, api_calls, serp_jobs, crawl_jobs)
                .await
            {
                warn!(tenant_id = %tenant_id, period = %period, error = %err, "quota usage sync failed for tenant");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_key_is_year_month() {
        let key = QuotaEngine::redis_key("acme", "2026-07", QuotaKind::SerpJobs);
        assert_eq!(key, "quota:acme:2026-07:serp_jobs");
    }

    #[test]
    fn key_round_trips_through_parse() {
        let key = QuotaEngine::redis_key("acme", "2026-07", QuotaKind::CrawlJobs);
        let (tenant_id, period, kind) = QuotaEngine::parse_key(&key).unwrap();
        assert_eq!(tenant_id, "acme");
        assert_eq!(period, "2026-07");
        assert_eq!(kind, QuotaKind::CrawlJobs);
    }

    #[test]
    fn parse_key_rejects_foreign_keys() {
        assert!(QuotaEngine::parse_key("other:acme:2026-07:serp_jobs").is_none());
        assert!(QuotaEngine::parse_key("quota:acme:2026-07:unknown_kind").is_none());
    }

    #[test]
    fn ttl_is_sixty_days() {
        assert_eq!(TTL_SECONDS, 5_184_000);
    }
}
