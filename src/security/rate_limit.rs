use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::HeaderName;
use actix_web::http::Method;
use actix_web::Error;
use dashmap::DashMap;
use futures::future::{ok, Ready};
use futures::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::security::error::ApiError;

/// Sliding-window verdict for one request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: i64,
}

#[derive(Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_per_minute: u32,
    pub anonymous_per_minute: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_per_minute: 100,
            anonymous_per_minute: 20,
            window_seconds: 60,
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// In-process sliding window. Correct for a single worker only; deployments
/// with multiple workers must use the shared Redis store.
pub struct InMemoryRateLimiter {
    requests: DashMap<String, Vec<f64>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self { requests: DashMap::new() }
    }

    fn check(&self, client_id: &str, limit: u32, window_seconds: u64) -> RateLimitInfo {
        let now = unix_now();
        let cutoff = now - window_seconds as f64;

        // Opportunistic cleanup when the map grows.
        if self.requests.len() > 10_000 {
            self.requests.retain(|_, stamps| {
                stamps.retain(|&t| t > cutoff);
                !stamps.is_empty()
            });
        }

        let mut entry = self.requests.entry(client_id.to_string()).or_default();
        entry.retain(|&t| t > cutoff);

        let count = entry.len() as u32;
        if count >= limit {
            let oldest = entry.iter().cloned().fold(f64::INFINITY, f64::min);
            return RateLimitInfo {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: (oldest + window_seconds as f64) as i64,
            };
        }

        entry.push(now);
        RateLimitInfo {
            allowed: true,
            limit,
            remaining: limit - count - 1,
            reset_at: (now + window_seconds as f64) as i64,
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "backend": "memory",
            "active_clients": self.requests.len(),
            "total_tracked": self.requests.iter().map(|e| e.value().len()).sum::<usize>(),
        })
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared sliding window over a Redis sorted set per client. Prune, count
/// and the conditional insert run inside one Lua script, so two concurrent
/// checks at the boundary cannot both succeed: the ZADD is gated on the
/// count in the same atomic step.
pub struct RedisRateLimiter {
    conn: redis::aio::MultiplexedConnection,
    script: redis::Script,
}

/// KEYS[1] = sorted set; ARGV = now, window, limit, member.
/// Returns {allowed, count_before, reset_at}.
const CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)

if count >= limit then
    local reset = now + window
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    if oldest[2] then
        reset = tonumber(oldest[2]) + window
    end
    return {0, count, math.floor(reset)}
end

-- ARGV[1] stays a string: redis.call truncates Lua numbers to integers.
redis.call('ZADD', key, ARGV[1], member)
redis.call('EXPIRE', key, window + 10)
return {1, count, math.floor(now + window)}
"#;

impl RedisRateLimiter {
    const KEY_PREFIX: &'static str = "greengate:ratelimit:";

    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn, script: redis::Script::new(CHECK_SCRIPT) })
    }

    async fn check(
        &self,
        client_id: &str,
        limit: u32,
        window_seconds: u64,
    ) -> redis::RedisResult<RateLimitInfo> {
        let mut conn = self.conn.clone();
        let now = unix_now();
        let key = format!("{}{}", Self::KEY_PREFIX, client_id);
        // Unique member per request keeps simultaneous arrivals distinct.
        let member = format!("{now}:{}", uuid::Uuid::new_v4());

        let (allowed, count, reset_at): (i32, u32, i64) = self
            .script
            .key(&key)
            .arg(now)
            .arg(window_seconds)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        if allowed == 0 {
            return Ok(RateLimitInfo { allowed: false, limit, remaining: 0, reset_at });
        }

        Ok(RateLimitInfo {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count + 1),
            reset_at,
        })
    }
}

/// Backend selection: Redis when configured (mandatory for multi-worker),
/// in-process map otherwise.
pub enum RateLimiterStore {
    Memory(InMemoryRateLimiter),
    Redis(RedisRateLimiter),
}

impl RateLimiterStore {
    pub async fn from_redis_url(redis_url: Option<&str>) -> Self {
        if let Some(url) = redis_url {
            match RedisRateLimiter::connect(url).await {
                Ok(limiter) => {
                    log::info!("rate limiter using shared redis store");
                    return RateLimiterStore::Redis(limiter);
                }
                Err(e) => {
                    log::warn!("redis unavailable ({e}), falling back to in-memory rate limiter");
                }
            }
        } else {
            log::info!("rate limiter using in-memory store (single worker only)");
        }
        RateLimiterStore::Memory(InMemoryRateLimiter::new())
    }

    pub async fn check(&self, client_id: &str, limit: u32, window_seconds: u64) -> RateLimitInfo {
        match self {
            RateLimiterStore::Memory(limiter) => limiter.check(client_id, limit, window_seconds),
            RateLimiterStore::Redis(limiter) => {
                match limiter.check(client_id, limit, window_seconds).await {
                    Ok(info) => info,
                    Err(e) => {
                        // A broken store must not take the API down.
                        log::error!("redis rate limit check failed: {e}");
                        RateLimitInfo {
                            allowed: true,
                            limit,
                            remaining: limit,
                            reset_at: (unix_now() + window_seconds as f64) as i64,
                        }
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        match self {
            RateLimiterStore::Memory(limiter) => limiter.stats(),
            RateLimiterStore::Redis(_) => serde_json::json!({ "backend": "redis" }),
        }
    }
}

/// Paths that never count against the sliding window. Admin and auth
/// endpoints are JWT-guarded and brute-force limited separately.
fn is_exempt(path: &str) -> bool {
    matches!(
        path,
        "/" | "/health" | "/health/detailed" | "/metrics" | "/openapi.json" | "/api-doc/openapi.json"
    ) || path.starts_with("/docs")
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api/v1/auth/")
        || path.starts_with("/api/v1/admin/")
}

/// Request-rate middleware. Runs after API-key admission, so authenticated
/// requests are keyed by their key prefix and anonymous ones by client IP.
#[derive(Clone)]
pub struct RateLimit {
    store: Arc<RateLimiterStore>,
    config: RateLimitConfig,
}

impl RateLimit {
    pub fn new(store: Arc<RateLimiterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: std::rc::Rc::new(service),
            store: self.store.clone(),
            config: self.config.clone(),
        })
    }
}

pub struct RateLimitMiddleware<S> {
    service: std::rc::Rc<S>,
    store: Arc<RateLimiterStore>,
    config: RateLimitConfig,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let store = self.store.clone();
        let config = self.config.clone();

        Box::pin(async move {
            if !config.enabled
                || req.method() == Method::OPTIONS
                || is_exempt(req.path())
            {
                return service.call(req).await;
            }

            let (client_id, limit) = match req.headers().get("x-api-key").and_then(|v| v.to_str().ok())
            {
                Some(key) => (
                    format!("key:{}", crate::security::api_keys::ApiKeyService::key_prefix(key)),
                    config.authenticated_per_minute,
                ),
                None => {
                    let ip = req
                        .connection_info()
                        .realip_remote_addr()
                        .unwrap_or("unknown")
                        .to_string();
                    (format!("ip:{ip}"), config.anonymous_per_minute)
                }
            };

            let info = store.check(&client_id, limit, config.window_seconds).await;

            if !info.allowed {
                let retry_after = (info.reset_at - unix_now() as i64).max(1);
                log::warn!("rate limit exceeded for {client_id} on {}", req.path());
                return Err(ApiError::RateLimited {
                    retry_after,
                    limit: info.limit,
                    reset_at: info.reset_at,
                }
                .into());
            }

            let mut res = service.call(req).await?;
            let headers = res.headers_mut();
            // The admission layer overwrites these with monthly-quota state
            // for authenticated requests.
            if let Ok(v) = info.limit.to_string().parse() {
                headers.insert(HeaderName::from_static("x-ratelimit-limit"), v);
            }
            if let Ok(v) = info.remaining.to_string().parse() {
                headers.insert(HeaderName::from_static("x-ratelimit-remaining"), v);
            }
            if let Ok(v) = info.reset_at.to_string().parse() {
                headers.insert(HeaderName::from_static("x-ratelimit-reset"), v);
            }
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_allows_up_to_limit_then_rejects() {
        let limiter = InMemoryRateLimiter::new();
        for i in 0..5 {
            let info = limiter.check("ip:10.0.0.1", 5, 60);
            assert!(info.allowed, "request {i} should pass");
            assert_eq!(info.remaining, 4 - i);
        }
        let info = limiter.check("ip:10.0.0.1", 5, 60);
        assert!(!info.allowed);
        assert_eq!(info.remaining, 0);
        assert!(info.reset_at > 0);
    }

    #[test]
    fn clients_are_isolated() {
        let limiter = InMemoryRateLimiter::new();
        for _ in 0..3 {
            limiter.check("ip:10.0.0.1", 3, 60);
        }
        assert!(!limiter.check("ip:10.0.0.1", 3, 60).allowed);
        assert!(limiter.check("key:gg_live_abcd...", 3, 60).allowed);
    }

    #[test]
    fn reset_at_is_oldest_plus_window() {
        let limiter = InMemoryRateLimiter::new();
        let first = limiter.check("c", 1, 60);
        let denied = limiter.check("c", 1, 60);
        assert!(!denied.allowed);
        // The window reopens when the first request ages out.
        assert!(denied.reset_at <= first.reset_at);
    }

    #[test]
    fn exemptions_cover_health_docs_and_admin() {
        assert!(is_exempt("/health"));
        assert!(is_exempt("/docs"));
        assert!(is_exempt("/swagger-ui/index.html"));
        assert!(is_exempt("/api/v1/auth/login"));
        assert!(is_exempt("/api/v1/admin/api-keys"));
        assert!(!is_exempt("/api/v1/validations/quick"));
        assert!(!is_exempt("/api/v1/reports/verify/GG-1-AAAA"));
    }
}
