use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_LIMIT: u32 = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

const KEY_PREFIX: &str = "ratelimit";

/// The admission decision for one inbound call. Computed exactly once per
/// request, before any upstream work begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Millisecond timestamp at which the current window rolls over.
    pub reset_at: i64,
}

/// Shared counter storage. `increment` must be atomic relative to other
/// concurrent callers for the same key; the post-increment count comes back
/// from the same operation, never from a separate read.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;
    async fn get(&self, key: &str) -> Result<u64>;
}

/// In-process counter store, used when no Redis endpoint is configured.
/// The mutex makes increment-and-read a single atomic step.
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("counter store mutex poisoned"))?;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| (0, now + ttl));
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn get(&self, key: &str) -> Result<u64> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("counter store mutex poisoned"))?;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(count, _)| *count)
            .unwrap_or(0))
    }
}

/// Upstash-style Redis REST store. The increment is a pipelined
/// INCR + PEXPIRE, so the count we act on is the atomic post-increment
/// value from the server.
pub struct RestCounterStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RestCounterStore {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(RestCounterStore {
            client,
            url: url.into(),
            token: token.into(),
        })
    }

    async fn execute(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.url.trim_end_matches('/'), path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("counter store returned {}", status));
        }
        Ok(response.json().await?)
    }

    fn result_as_count(value: &Value) -> u64 {
        match value.get("result") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }
}

#[async_trait]
impl CounterStore for RestCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let commands = json!([
            ["INCR", key],
            ["PEXPIRE", key, ttl.as_millis() as u64],
        ]);
        let results = self.execute("/pipeline", commands).await?;
        let first = results
            .as_array()
            .and_then(|r| r.first())
            .ok_or_else(|| anyhow!("malformed pipeline response"))?;
        Ok(Self::result_as_count(first))
    }

    async fn get(&self, key: &str) -> Result<u64> {
        let result = self.execute("", json!(["GET", key])).await?;
        Ok(Self::result_as_count(&result))
    }
}

/// Sliding-window admission control keyed by caller identifier.
///
/// Two fixed windows approximate the rolling interval: the previous
/// window's count is weighted by how much of it still overlaps the rolling
/// hour, then added to the current count.
pub struct RateLimiter {
    store: Box<dyn CounterStore>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Box<dyn CounterStore>, limit: u32, window: Duration) -> Self {
        RateLimiter {
            store,
            limit,
            window,
        }
    }

    /// Admit or reject one request from `identifier`.
    ///
    /// If the counter store itself fails the limiter fails open: the request
    /// is admitted with a full-quota decision and the fault is logged.
    pub async fn check(&self, identifier: &str) -> RateDecision {
        let now_ms = chrono::Utc::now().timestamp_millis();
        match self.try_check(identifier, now_ms).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!("counter store unavailable, admitting request: {err:#}");
                RateDecision {
                    allowed: true,
                    limit: self.limit,
                    remaining: self.limit,
                    reset_at: now_ms + self.window.as_millis() as i64,
                }
            }
        }
    }

    async fn try_check(&self, identifier: &str, now_ms: i64) -> Result<RateDecision> {
        let window_ms = self.window.as_millis() as i64;
        let current_window = now_ms / window_ms;

        let current_key = format!("{KEY_PREFIX}:{identifier}:{current_window}");
        let previous_key = format!("{KEY_PREFIX}:{identifier}:{}", current_window - 1);

        // Keys live for two windows so the previous bucket stays readable.
        let current = self.store.increment(&current_key, self.window * 2).await?;
        let previous = self.store.get(&previous_key).await?;

        let elapsed_ms = now_ms - current_window * window_ms;
        let count = weighted_count(previous, current, elapsed_ms, window_ms);

        Ok(RateDecision {
            allowed: count <= self.limit as u64,
            limit: self.limit,
            remaining: (self.limit as i64 - count as i64).max(0) as u32,
            reset_at: (current_window + 1) * window_ms,
        })
    }
}

/// Requests counted against the rolling window: the previous bucket scaled
/// by its remaining overlap, plus everything in the current bucket.
fn weighted_count(previous: u64, current: u64, elapsed_ms: i64, window_ms: i64) -> u64 {
    let overlap = 1.0 - (elapsed_ms as f64 / window_ms as f64);
    (previous as f64 * overlap) as u64 + current
}
