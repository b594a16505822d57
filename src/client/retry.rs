//! Retry policy shared by every tool call.
//!
//! Upstream LLM providers do not return structured rate-limit errors through
//! the tool layer, so classification is substring matching on error text. It is
//! a heuristic, kept behind [`ErrorClassifier`] so another backend can swap it
//! without touching the retry loop.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

/// How a failed call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network blip or recoverable bad response: retry once on a fresh connection.
    Transient,
    /// Burst limit: back off and retry a bounded number of times.
    RateLimited { retry_after: Option<Duration> },
    /// Sustained quota exhausted: waiting cannot help.
    QuotaExhausted,
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, message: &str) -> FailureClass;
}

/// Phrase-based classifier tuned on Groq and Gemini error texts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderPhraseClassifier;

const QUOTA_MARKERS: [&str; 8] = [
    "insufficient_quota",
    "exceeded your current quota",
    "tokens per day",
    "requests per day",
    "(tpd)",
    "(rpd)",
    "daily limit",
    "billing",
];

const RATE_LIMIT_MARKERS: [&str; 7] = [
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "resource_exhausted",
    "try again in",
    "retry after",
];

static STATUS_429: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b429\b").expect("static regex"));
static RETRY_HINT_MS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:try again|retry)\s+(?:in|after)\s+(\d+(?:\.\d+)?)ms\b").expect("static regex")
});
static RETRY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:try again|retry)\s+(?:in|after)\s+(?:(\d+)h)?(?:(\d+)m(?:in)?)?\s*(?:(\d+(?:\.\d+)?)\s*s(?:ec(?:ond)?s?)?)?",
    )
    .expect("static regex")
});

impl ErrorClassifier for ProviderPhraseClassifier {
    fn classify(&self, message: &str) -> FailureClass {
        let lower = message.to_lowercase();
        if QUOTA_MARKERS.iter().any(|m| lower.contains(m)) {
            return FailureClass::QuotaExhausted;
        }
        if STATUS_429.is_match(&lower) || RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
            return FailureClass::RateLimited {
                retry_after: retry_hint(message),
            };
        }
        FailureClass::Transient
    }
}

/// Parses hints like "try again in 1m30s" or "retry after 450ms".
///
/// Whole seconds are rounded up and one second of margin is added, so
/// "1m30s" yields 91s.
pub fn retry_hint(message: &str) -> Option<Duration> {
    if let Some(caps) = RETRY_HINT_MS.captures(message) {
        let millis: f64 = caps[1].parse().ok()?;
        return Some(Duration::from_millis(millis.ceil() as u64));
    }

    let caps = RETRY_HINT.captures(message)?;
    let hours = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
    let minutes = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok());
    let seconds = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok());
    if hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    let total = hours
        .unwrap_or(0)
        .saturating_mul(3600)
        .saturating_add(minutes.unwrap_or(0).saturating_mul(60))
        .saturating_add(seconds.unwrap_or(0.0).ceil() as u64)
        .saturating_add(1);
    Some(Duration::from_secs(total))
}

/// Uniform retry parameters applied by the tool client.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed while rate limited, the first call included.
    pub max_attempts: u32,
    /// Backoff used when the error carries no hint; doubled per attempt.
    pub base_delay: Duration,
    /// Upper bound on any single wait.
    pub cap: Duration,
    /// Fresh-connection retries after a transient failure.
    pub transient_retries: u32,
    pub classifier: Arc<dyn ErrorClassifier>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            cap: Duration::from_secs(60),
            transient_retries: 1,
            classifier: Arc::new(ProviderPhraseClassifier),
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("cap", &self.cap)
            .field("transient_retries", &self.transient_retries)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classify(&self, message: &str) -> FailureClass {
        self.classifier.classify(message)
    }

    /// Wait before rate-limit retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let wait = hint.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
        });
        wait.min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_second_hint_rounds_up_with_margin() {
        let msg = "Groq API Error: Rate limit reached for model. Please try again in 1m30s.";
        assert_eq!(retry_hint(msg), Some(Duration::from_secs(91)));
        assert_eq!(
            retry_hint("try again in 12.4s"),
            Some(Duration::from_secs(14))
        );
        assert_eq!(retry_hint("Retry after 2m"), Some(Duration::from_secs(121)));
        assert_eq!(retry_hint("try again in 450ms"), Some(Duration::from_millis(450)));
        assert_eq!(retry_hint("try again in a moment"), None);
    }

    #[test]
    fn absurd_hint_saturates_and_is_capped() {
        let hint = retry_hint("Rate limit: try again in 99999999999999999h").unwrap();
        assert_eq!(hint, Duration::from_secs(u64::MAX));
        assert_eq!(RetryPolicy::default().backoff(1, Some(hint)), Duration::from_secs(60));
    }

    #[test]
    fn hinted_backoff_is_capped() {
        let policy = RetryPolicy::default();
        let hint = retry_hint("Please try again in 1m30s");
        assert_eq!(policy.backoff(1, hint), Duration::from_secs(60));
    }

    #[test]
    fn default_backoff_doubles_until_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, None), Duration::from_secs(10));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(20));
        assert_eq!(policy.backoff(4, None), Duration::from_secs(60));
    }

    #[test]
    fn classifies_provider_messages() {
        let c = ProviderPhraseClassifier;
        assert_eq!(
            c.classify("Groq API Error: Limit 100000, Used 99950 on tokens per day (TPD)"),
            FailureClass::QuotaExhausted
        );
        assert_eq!(
            c.classify("HTTP 429 Too Many Requests"),
            FailureClass::RateLimited { retry_after: None }
        );
        assert_eq!(
            c.classify("RESOURCE_EXHAUSTED: please try again in 20s"),
            FailureClass::RateLimited {
                retry_after: Some(Duration::from_secs(21))
            }
        );
        assert_eq!(c.classify("connection reset by peer"), FailureClass::Transient);
        assert_eq!(c.classify("read 1429 bytes"), FailureClass::Transient);
    }

    #[test]
    fn classifier_is_pluggable() {
        struct AlwaysQuota;
        impl ErrorClassifier for AlwaysQuota {
            fn classify(&self, _: &str) -> FailureClass {
                FailureClass::QuotaExhausted
            }
        }
        let policy = RetryPolicy::default().with_classifier(Arc::new(AlwaysQuota));
        assert_eq!(policy.classify("anything"), FailureClass::QuotaExhausted);
    }
}
