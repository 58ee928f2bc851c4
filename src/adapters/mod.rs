//! Pluggable ports to external services (Component B). The engine never
//! calls `reqwest` directly outside this module; everything else talks to
//! these traits so tests can swap in fakes.

pub mod geocoding;
pub mod prayer_time;

pub use geocoding::{GeocodingAdapter, ReverseGeocode};
pub use prayer_time::PrayerTimeAdapter;

use crate::error::EngineError;
use std::future::Future;
use std::time::Duration;

/// Capped exponential backoff retry for adapter calls, per the spec's
/// error-handling design: 3 tries, 250ms base, 4s cap, only on
/// [`EngineError::Transient`].
pub async fn retry_transient<T, F, Fut>(mut attempt: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    const MAX_TRIES: u32 = 3;
    const BASE: Duration = Duration::from_millis(250);
    const CAP: Duration = Duration::from_secs(4);

    let mut last_err = None;
    for try_idx in 0..MAX_TRIES {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => {
                last_err = Some(e);
                if try_idx + 1 < MAX_TRIES {
                    let backoff = BASE.saturating_mul(1u32 << try_idx).min(CAP);
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| EngineError::Internal("retry loop exited without error".into())))
}

/// Bounds an adapter call (including its retries) by the deadline the
/// caller was given, so a slow upstream cannot hold a request open
/// indefinitely.
pub async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> Result<T, EngineError>
where
    Fut: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::transient(format!("deadline of {}ms exceeded", deadline.as_millis()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(EngineError::transient("timeout"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Permanent("bad params".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_deadline_passes_through_a_fast_success() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, EngineError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn with_deadline_turns_a_slow_future_into_a_transient_error() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, EngineError>(())
        })
        .await;
        assert!(result.unwrap_err().is_transient());
    }
}
