//! Per-IP rate limiting.
//!
//! Token buckets keyed by client IP, applied to every route.  The anonymous
//! intake endpoint and the bearer-token surfaces get the same budget; limits
//! come from [`ServerConfig`](crate::config::ServerConfig).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Seconds between bucket eviction sweeps.
const PURGE_INTERVAL_SECS: u64 = 300;

/// Idle seconds after which a bucket is dropped.
const PURGE_MAX_IDLE_SECS: f64 = 600.0;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    touched: Instant,
}

impl Bucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            touched: Instant::now(),
        }
    }

    /// Refill for the time since the last request, then try to pay for this
    /// one.
    fn admit(&mut self, rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let idle = now.duration_since(self.touched).as_secs_f64();
        self.touched = now;
        self.tokens = capacity.min(self.tokens + idle * rate);

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    fn idle_for(&self, now: Instant) -> f64 {
        now.duration_since(self.touched).as_secs_f64()
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    /// `rate` is tokens regained per second, `capacity` the burst ceiling.
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    /// Whether one more request from `ip` fits its budget.  Unknown IPs
    /// start with a full bucket.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(self.capacity))
            .admit(self.rate, self.capacity)
    }

    /// Drop buckets idle longer than `max_idle_secs` so the map does not
    /// grow with every IP ever seen.
    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.idle_for(now) < max_idle_secs);

        let evicted = before - buckets.len();
        if evicted > 0 {
            debug!(evicted, tracked = buckets.len(), "Evicted idle rate-limit buckets");
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// Spawn the periodic eviction task for idle buckets.
pub fn spawn_purge_task(limiter: RateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            limiter.purge_stale(PURGE_MAX_IDLE_SECS).await;
        }
    });
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    // Requests with no derivable peer address pass through.
    if let Some(ip) = client_ip(&req) {
        if !limiter.check(ip).await {
            warn!(ip = %ip, "Rate limit exceeded");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(req).await)
}

/// Socket address from axum first, proxy headers as fallback.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    let header_ip = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
    };

    // Proxies append to x-forwarded-for; the first entry is the client.
    header_ip("x-forwarded-for").or_else(|| header_ip("x-real-ip"))
}
