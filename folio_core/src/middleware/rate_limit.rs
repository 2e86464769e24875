//! Sliding-window rate limiting per client IP

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_seconds))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Records a hit at `now`. Returns the remaining budget, or the seconds
    /// until the oldest hit leaves the window.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Result<usize, u64> {
        let mut requests = self.requests.lock();
        let entries = requests.entry(ip).or_default();

        while let Some(&oldest) = entries.front() {
            if now.duration_since(oldest) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.max_requests {
            let oldest = entries.front().copied().unwrap_or(now);
            let reset_in = self.window.saturating_sub(now.duration_since(oldest));
            return Err(reset_in.as_secs().max(1));
        }

        entries.push_back(now);
        Ok(self.max_requests - entries.len())
    }

    pub fn check(&self, ip: IpAddr) -> Result<usize, u64> {
        self.check_at(ip, Instant::now())
    }

    /// Drops clients with no hits inside the window.
    pub fn purge_idle(&self) {
        let now = Instant::now();
        let window = self.window;
        self.requests
            .lock()
            .retain(|_, entries| entries.back().map_or(false, |&last| now.duration_since(last) < window));
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !request.uri().path().starts_with("/api") {
        return Ok(next.run(request).await);
    }

    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let remaining = limiter.check(ip).map_err(|retry_after| {
        warn!(%ip, retry_after, "Rate limit exceeded");
        AppError::RateLimited { retry_after }
    })?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.max_requests()));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_and_window_slide() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let start = Instant::now();

        assert_eq!(limiter.check_at(ip, start), Ok(1));
        assert_eq!(limiter.check_at(ip, start + Duration::from_secs(10)), Ok(0));

        let retry = limiter.check_at(ip, start + Duration::from_secs(20)).unwrap_err();
        assert_eq!(retry, 40);

        assert!(limiter.check_at(ip, start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("10.0.0.1".parse().unwrap(), now).is_ok());
        assert!(limiter.check_at("10.0.0.1".parse().unwrap(), now).is_err());
        assert!(limiter.check_at("10.0.0.2".parse().unwrap(), now).is_ok());
    }
}
