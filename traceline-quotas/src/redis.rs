use traceline_event_schema::{OrgEnrichedApiKey, OrganizationId, RateLimitResource};
use traceline_redis::RedisPool;

use crate::{effective_limit, EffectiveLimit, RateLimitError};

/// The `grace` period accommodates clock drift between this host and the
/// Redis instance when computing key TTLs.
const GRACE: u64 = 60;

/// One fixed window of a budget.
///
/// The window slot is derived from wall-clock seconds, so all servers agree
/// on the same counter key without coordination.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Window {
    slot: u64,
    duration: u64,
}

impl Window {
    fn new(now: u64, duration: u64) -> Self {
        Self {
            slot: now / duration,
            duration,
        }
    }

    /// The Redis counter key for this window.
    fn key(&self, resource: RateLimitResource, org_id: &OrganizationId) -> String {
        format!(
            "rate-limit:{resource}:{org_id}:{slot}",
            resource = resource.name(),
            slot = self.slot,
        )
    }

    /// Unix timestamp at which this window ends and the budget resets.
    fn reset_at(&self) -> u64 {
        (self.slot + 1) * self.duration
    }

    /// Milliseconds from `now` until the budget resets.
    fn ms_before_reset(&self, now: u64) -> u64 {
        self.reset_at().saturating_sub(now) * 1000
    }
}

/// The outcome of one admission check.
///
/// Exhaustion is represented in the data, never as an error: the caller
/// inspects [`is_exceeded`](Self::is_exceeded) and decides policy.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitCheck {
    /// The checked resource.
    pub resource: RateLimitResource,

    /// The budget per window.
    pub limit: u32,

    /// Total points consumed in the current window, including this call.
    pub consumed: u64,

    /// Points left in the current window.
    pub remaining: u32,

    /// Unix timestamp at which the window resets.
    pub reset_at: u64,

    /// Milliseconds until the window resets.
    pub ms_before_next: u64,

    /// Whether this call opened the window.
    pub is_first_in_duration: bool,
}

impl RateLimitCheck {
    /// Whether this call exceeded the budget and must be rejected.
    pub fn is_exceeded(&self) -> bool {
        self.consumed > u64::from(self.limit)
    }

    /// Seconds until the window resets, rounded up for `Retry-After`.
    pub fn retry_after_seconds(&self) -> u64 {
        self.ms_before_next.div_ceil(1000)
    }
}

/// A rate limiter tracking fixed-window budgets in a shared Redis.
///
/// Admission consumes one point with an atomic `INCR`; the key expires one
/// window (plus grace) after creation, so abandoned windows clean themselves
/// up. Concurrent callers on the same `(org, resource)` serialize through
/// Redis and observe a consistent count.
#[derive(Clone, Debug)]
pub struct RedisRateLimiter {
    pool: RedisPool,
}

impl RedisRateLimiter {
    /// Creates a rate limiter on the given pool.
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Checks admission of one request for `api_key` on `resource`.
    ///
    /// Returns `Ok(None)` when the resource is unlimited for this
    /// organization. Redis errors propagate; callers treat them as an
    /// infrastructure failure rather than a limit decision.
    pub async fn check(
        &self,
        api_key: &OrgEnrichedApiKey,
        resource: RateLimitResource,
    ) -> Result<Option<RateLimitCheck>, RateLimitError> {
        let Some(limit) = effective_limit(api_key, resource)? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let check = self
            .consume(&api_key.org_id, resource, limit, now)
            .await?;

        if check.is_exceeded() {
            traceline_log::debug!(
                org_id = %api_key.org_id,
                resource = resource.name(),
                consumed = check.consumed,
                limit = check.limit,
                "rate limit exceeded",
            );
        }

        Ok(Some(check))
    }

    async fn consume(
        &self,
        org_id: &OrganizationId,
        resource: RateLimitResource,
        limit: EffectiveLimit,
        now: u64,
    ) -> Result<RateLimitCheck, RateLimitError> {
        let window = Window::new(now, limit.duration);
        let key = window.key(resource, org_id);

        // INCR + EXPIRE NX in one roundtrip. NX leaves an existing TTL
        // untouched, so only the first consumer of a window pays for it.
        let mut pipeline = redis::pipe();
        pipeline
            .cmd("INCR")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(limit.duration + GRACE)
            .arg("NX")
            .ignore();

        let (consumed,): (u64,) = self.pool.query_pipeline(&pipeline).await?;

        let remaining = u64::from(limit.points).saturating_sub(consumed) as u32;

        Ok(RateLimitCheck {
            resource,
            limit: limit.points,
            consumed,
            remaining,
            reset_at: window.reset_at(),
            ms_before_next: window.ms_before_reset(now),
            is_first_in_duration: consumed == 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;
    use traceline_event_schema::Plan;
    use traceline_redis::RedisConfigOptions;

    use super::*;

    #[test]
    fn window_slot_arithmetic() {
        let window = Window::new(125, 60);
        assert_eq!(window.slot, 2);
        assert_eq!(window.reset_at(), 180);
        assert_eq!(window.ms_before_reset(125), 55_000);

        // The last second of the window still belongs to it.
        let window = Window::new(179, 60);
        assert_eq!(window.slot, 2);
        assert_eq!(window.ms_before_reset(179), 1_000);

        // The next second opens a new slot.
        let window = Window::new(180, 60);
        assert_eq!(window.slot, 3);
    }

    #[test]
    fn window_key_contains_resource_org_and_slot() {
        let window = Window::new(120, 60);
        let key = window.key(RateLimitResource::Ingestion, &OrganizationId::new("org-9"));
        assert_eq!(key, "rate-limit:ingestion:org-9:2");
    }

    #[test]
    fn exceeded_only_past_the_budget() {
        let check = |consumed| RateLimitCheck {
            resource: RateLimitResource::Ingestion,
            limit: 100,
            consumed,
            remaining: 100u32.saturating_sub(consumed as u32),
            reset_at: 180,
            ms_before_next: 30_000,
            is_first_in_duration: consumed == 1,
        };

        assert!(!check(1).is_exceeded());
        assert!(!check(100).is_exceeded());
        assert!(check(101).is_exceeded());
        assert_eq!(check(101).remaining, 0);
        assert_eq!(check(101).retry_after_seconds(), 30);
    }

    fn test_api_key() -> OrgEnrichedApiKey {
        OrgEnrichedApiKey {
            org_id: OrganizationId::new(format!("org-{}", uuid_like())),
            plan: Plan::Default,
            rate_limit_overrides: smallvec![],
        }
    }

    // Pseudo-unique suffix so parallel test runs do not share counters.
    fn uuid_like() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos()
    }

    fn build_rate_limiter() -> RedisRateLimiter {
        let url = std::env::var("TRACELINE_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned());

        RedisRateLimiter::new(
            RedisPool::single(&url, RedisConfigOptions::default()).expect("redis pool"),
        )
    }

    // Requires a running Redis; enable with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn consumes_budget_until_exhaustion() {
        let limiter = build_rate_limiter();
        let mut api_key = test_api_key();
        api_key.rate_limit_overrides =
            smallvec![traceline_event_schema::RateLimitConfig::limited(
                RateLimitResource::Ingestion,
                3,
                60
            )];

        for i in 1..=3u64 {
            let check = limiter
                .check(&api_key, RateLimitResource::Ingestion)
                .await
                .unwrap()
                .unwrap();
            assert!(!check.is_exceeded());
            assert_eq!(check.consumed, i);
            assert_eq!(check.is_first_in_duration, i == 1);
        }

        let check = limiter
            .check(&api_key, RateLimitResource::Ingestion)
            .await
            .unwrap()
            .unwrap();
        assert!(check.is_exceeded());
        assert_eq!(check.remaining, 0);
        assert!(check.retry_after_seconds() <= 60);
    }

    // Requires a running Redis; enable with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn unlimited_resource_skips_redis() {
        let limiter = build_rate_limiter();
        let api_key = test_api_key();

        let check = limiter
            .check(&api_key, RateLimitResource::Prompts)
            .await
            .unwrap();
        assert!(check.is_none());
    }
}
