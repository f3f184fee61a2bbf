use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tower::{Layer, Service};
use tracing::warn;

const DROP_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ThrottleLayer {
    rate_per_sec: f64,
    burst: f64,
}

impl ThrottleLayer {
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            rate_per_sec: f64::from(rate_per_sec),
            burst: f64::from(burst),
        }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = Throttle<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Throttle {
            inner,
            buckets: Arc::new(DashMap::new()),
            drops: Arc::new(DropCounter::new()),
            rate_per_sec: self.rate_per_sec,
            burst: self.burst,
        }
    }
}

#[derive(Clone)]
pub struct Throttle<S> {
    inner: S,
    buckets: Arc<DashMap<String, Bucket>>,
    drops: Arc<DropCounter>,
    rate_per_sec: f64,
    burst: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

struct DropCounter {
    since_log: AtomicU64,
    last_log: Mutex<Instant>,
}

impl DropCounter {
    fn new() -> Self {
        Self {
            since_log: AtomicU64::new(0),
            last_log: Mutex::new(Instant::now()),
        }
    }

    fn record(&self) {
        self.since_log.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut last = self.last_log.lock().unwrap();
        if now.saturating_duration_since(*last) >= DROP_LOG_INTERVAL {
            let dropped = self.since_log.swap(0, Ordering::Relaxed);
            if dropped > 0 {
                warn!("throttled {dropped} requests in the last minute");
            }
            *last = now;
        }
    }
}

impl<S, ReqBody> Service<axum::http::Request<ReqBody>> for Throttle<S>
where
    S: Service<axum::http::Request<ReqBody>, Response = axum::http::Response<axum::body::Body>>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: axum::http::Request<ReqBody>) -> Self::Future {
        // Direct connections (no proxy header) are not throttled.
        if let Some(client) = forwarded_client(&req) {
            if !self.take_token(&client) {
                self.drops.record();
                return Box::pin(async move {
                    Ok(axum::http::Response::builder()
                        .status(axum::http::StatusCode::TOO_MANY_REQUESTS)
                        .body(axum::body::Body::from("rate limited"))
                        .unwrap())
                });
            }
        }

        let fut = self.inner.call(req);
        Box::pin(fut)
    }
}

impl<S> Throttle<S> {
    fn take_token(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.burst,
                refilled_at: now,
            });
        let elapsed = now
            .saturating_duration_since(bucket.refilled_at)
            .as_secs_f64();
        bucket.tokens = self.burst.min(bucket.tokens + elapsed * self.rate_per_sec);
        bucket.refilled_at = now;
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}

fn forwarded_client<B>(req: &axum::http::Request<B>) -> Option<String> {
    let header = req.headers().get("x-forwarded-for")?.to_str().ok()?;
    let first = header.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
