//! Transport-error classification, retry policy, and partition detection.
//!
//! The word-boundary matching and the retry executor's shape (exponential backoff, capped
//! delay, jitter, bounded attempts) mirror `error_handling_example.cpp`'s `classify_error`/
//! `execute_with_retry`. `raft_core::error::RaftError`/`TransportErrorKind` already carry the
//! classification taxonomy; this module adds the text classifier and the two stateful helpers
//! (retry, partition window) that consume it.

use std::collections::VecDeque;
use std::future::Future;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::Duration;

use crate::error::TransportErrorKind;

/// Classify a transport failure by matching whole words (not substrings) in its message.
/// Word-boundary matching means a message like "install_snapshot_timeout" does not spuriously
/// classify as `NetworkTimeout` merely because "timeout" appears inside a configuration field
/// name.
pub fn classify(message: &str) -> TransportErrorKind {
    let words = tokenize(message);
    let has = |w: &str| words.iter().any(|t| t == w);
    let has_phrase = |a: &str, b: &str| words.windows(2).any(|pair| pair[0] == a && pair[1] == b);

    if has("timeout") || has_phrase("timed", "out") {
        return TransportErrorKind::NetworkTimeout;
    }
    if has("refused") {
        return TransportErrorKind::ConnectionRefused;
    }
    if has("unreachable") || has_phrase("no", "route") {
        return TransportErrorKind::NetworkUnreachable;
    }
    if has("temporary") || has_phrase("try", "again") {
        return TransportErrorKind::TemporaryFailure;
    }
    if has("parse") || has("serialize") || has("format") {
        return TransportErrorKind::SerializationError;
    }
    if has("protocol") {
        return TransportErrorKind::ProtocolError;
    }
    TransportErrorKind::Unknown
}

/// Lowercase, punctuation-stripped word tokens, so matching is on whole words only.
fn tokenize(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Exponential-backoff-with-jitter retry parameters for one RPC kind.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fractional jitter applied symmetrically, e.g. `0.1` means `±10%`.
    pub jitter: f64,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// The delay before attempt `k` (1-indexed), before jitter is applied.
    fn base_delay(&self, k: u32) -> Duration {
        let millis = self.initial_delay.as_secs_f64() * self.multiplier.powi(k as i32 - 1) * 1000.0;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    fn jittered_delay(&self, k: u32) -> Duration {
        let base = self.base_delay(k).as_millis() as f64;
        if self.jitter <= 0.0 {
            return Duration::from_millis(base as u64);
        }
        let spread = base * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread, spread);
        Duration::from_millis((base + offset).max(0.0) as u64)
    }
}

/// Run `op` up to `policy.max_attempts` times, classifying each failure's message via
/// [`classify`] and stopping early if the classification is non-retryable
/// ([`TransportErrorKind::is_retryable`]). Waits `policy`'s backoff schedule between attempts.
pub async fn retry_with_policy<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: ToString,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify(&e.to_string());
                if !kind.is_retryable() || attempt >= policy.max_attempts {
                    return Err(e);
                }
                sleep(policy.jittered_delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// A sliding window over the last `CAPACITY` transport-error classifications, used to declare
/// and clear a suspected network partition.
pub struct PartitionDetector {
    window: VecDeque<TransportErrorKind>,
}

const WINDOW_CAPACITY: usize = 10;

impl Default for PartitionDetector {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
        }
    }
}

impl PartitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a transport call; evicts the oldest entry once the window is full.
    pub fn record(&mut self, kind: TransportErrorKind) {
        if self.window.len() == WINDOW_CAPACITY {
            self.window.pop_front();
        }
        self.window.push_back(kind);
    }

    /// True when at least two-thirds of the window is network-family and none is from a
    /// non-retryable class.
    pub fn is_partitioned(&self) -> bool {
        if self.window.is_empty() {
            return false;
        }
        let network = self.window.iter().filter(|k| k.is_network_family()).count();
        let has_non_retryable = self.window.iter().any(|k| !k.is_retryable());
        !has_non_retryable && network * 3 >= self.window.len() * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_network_timeout_on_word_boundary() {
        assert_eq!(classify("request timed out waiting for reply"), TransportErrorKind::NetworkTimeout);
        assert_eq!(classify("RPC timeout exceeded"), TransportErrorKind::NetworkTimeout);
        // "timeout" appearing inside a config field name must not match.
        assert_ne!(classify("install_snapshot_timeout must be positive"), TransportErrorKind::NetworkTimeout);
    }

    #[test]
    fn classifies_every_table_row() {
        assert_eq!(classify("connection refused by target"), TransportErrorKind::ConnectionRefused);
        assert_eq!(classify("network is unreachable"), TransportErrorKind::NetworkUnreachable);
        assert_eq!(classify("no route to host"), TransportErrorKind::NetworkUnreachable);
        assert_eq!(classify("temporary failure"), TransportErrorKind::TemporaryFailure);
        assert_eq!(classify("please try again"), TransportErrorKind::TemporaryFailure);
        assert_eq!(classify("failed to parse message"), TransportErrorKind::SerializationError);
        assert_eq!(classify("protocol violation detected"), TransportErrorKind::ProtocolError);
        assert_eq!(classify("something unexpected happened"), TransportErrorKind::Unknown);
    }

    #[tokio::test]
    async fn retry_stops_on_non_retryable_classification() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts: 5,
        };
        let mut attempts = 0;
        let result: Result<(), String> = retry_with_policy(&policy, || {
            attempts += 1;
            async { Err("protocol violation".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts: 5,
        };
        let mut attempts = 0;
        let result: Result<&str, String> = retry_with_policy(&policy, || {
            attempts += 1;
            let this_attempt = attempts;
            async move {
                if this_attempt < 3 {
                    Err("temporary failure, try again".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn partition_detector_trips_on_majority_network_errors() {
        let mut det = PartitionDetector::new();
        for _ in 0..3 {
            det.record(TransportErrorKind::NetworkTimeout);
        }
        assert!(det.is_partitioned());
        det.record(TransportErrorKind::SerializationError);
        assert!(!det.is_partitioned());
    }
}
