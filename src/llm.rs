//! Optional LLM client used only for query keyword-extraction assistance
//! (§4.6.1). Every call site tolerates this being entirely unconfigured or
//! failing — the retriever always has a rule-based fallback — so nothing
//! here is on the path to search correctness (§5).

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `complete(prompt) -> text`, per §6's optional LLM interface.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Runs `client.complete(prompt)` under `timeout`; any error or expiry
/// collapses to `None` so the caller can fall back without inspecting why.
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    prompt: &str,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, client.complete(prompt)).await {
        Ok(Ok(text)) => Some(text),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

/// Atomics-based circuit breaker (closed/open/half-open) plus jittered
/// exponential backoff, guarding calls to the external LLM (§5). The
/// circuit opens after `failure_threshold` consecutive failures and
/// half-opens again after `open_duration`; a success in half-open closes
/// it, a failure reopens it.
pub struct RateLimiter {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicU64,
    calls: AtomicU64,
    failure_threshold: u32,
    open_duration: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    pub fn new(failure_threshold: u32, open_duration: Duration, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            failure_threshold,
            open_duration,
            base_delay,
            max_delay,
        }
    }

    /// `true` when a call may proceed right now; flips Open -> HalfOpen once
    /// `open_duration` has elapsed since the circuit tripped.
    pub fn allow(&self) -> bool {
        match CircuitState::from_u8(self.state.load(Ordering::SeqCst)) {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened = self.opened_at_ms.load(Ordering::SeqCst);
                if now_ms().saturating_sub(opened) >= self.open_duration.as_millis() as u64 {
                    self.state.store(CircuitState::HalfOpen.as_u8(), Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.state.store(CircuitState::Closed.as_u8(), Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            self.state.store(CircuitState::Open.as_u8(), Ordering::SeqCst);
            self.opened_at_ms.store(now_ms(), Ordering::SeqCst);
        }
    }

    /// Jittered exponential backoff for the current failure streak. Jitter
    /// only needs to desynchronize concurrent callers, not resist
    /// prediction, so a counter-seeded LCG is enough — no `rand` dependency.
    pub fn backoff_delay(&self) -> Duration {
        let failures = self.consecutive_failures.load(Ordering::SeqCst).min(10);
        let exp = self.base_delay.as_millis() as u64 * (1u64 << failures);
        let capped = exp.min(self.max_delay.as_millis() as u64);
        let seed = self.calls.fetch_add(1, Ordering::SeqCst);
        let jitter = lcg_next(seed) % (capped / 4 + 1);
        Duration::from_millis(capped + jitter)
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Numerical-Recipes LCG constants; deterministic, dependency-free jitter.
fn lcg_next(seed: u64) -> u64 {
    seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    struct FlakyClient {
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated failure")
            } else {
                Ok("keywords: foo, bar".to_string())
            }
        }
    }

    #[tokio::test]
    async fn timeout_wrapper_returns_none_on_slow_client() {
        struct SlowClient;
        #[async_trait]
        impl LlmClient for SlowClient {
            async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("late".to_string())
            }
        }
        let result = complete_with_timeout(&SlowClient, "q", Duration::from_millis(10)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn timeout_wrapper_returns_some_on_fast_success() {
        let client = FlakyClient {
            fail: Arc::new(AtomicBool::new(false)),
        };
        let result = complete_with_timeout(&client, "q", Duration::from_secs(1)).await;
        assert_eq!(result.as_deref(), Some("keywords: foo, bar"));
    }

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), Duration::from_millis(10), Duration::from_secs(1));
        assert!(limiter.allow());
        limiter.record_failure();
        limiter.record_failure();
        assert!(limiter.allow());
        limiter.record_failure();
        assert!(!limiter.allow());
    }

    #[test]
    fn breaker_closes_after_success() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), Duration::from_millis(10), Duration::from_secs(1));
        limiter.record_failure();
        assert!(!limiter.allow());
        // Simulate the open window elapsing by constructing a fresh limiter
        // with a zero open_duration instead of sleeping in a unit test.
        let limiter = RateLimiter::new(1, Duration::from_millis(0), Duration::from_millis(10), Duration::from_secs(1));
        limiter.record_failure();
        assert!(limiter.allow()); // half-open immediately
        limiter.record_success();
        assert!(limiter.allow());
    }
}
