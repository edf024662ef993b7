//! Property tests for the pieces of the crate whose invariants are best
//! stated over arbitrary inputs rather than a handful of fixed cases.

use std::sync::atomic::{AtomicU32, Ordering};

use browservisor::circular_buffer::CircularBuffer;
use browservisor::errors::McpError;
use browservisor::retry::{retry_with_backoff, RetryStrategy};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

proptest! {
    /// No sequence of writes, however chopped up, can push a `CircularBuffer`
    /// past its declared capacity, and the buffer always keeps the most
    /// recent bytes written.
    #[test]
    fn circular_buffer_never_exceeds_capacity(
        capacity in 1usize..256,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32),
    ) {
        let mut buffer = CircularBuffer::new(capacity);
        let mut model: Vec<u8> = Vec::new();

        for chunk in &chunks {
            buffer.write(chunk);
            model.extend_from_slice(chunk);
            prop_assert!(buffer.len() <= capacity);
        }
        if model.len() > capacity {
            model.drain(0..model.len() - capacity);
        }

        let mut out = vec![0u8; buffer.len()];
        let n = buffer.read(&mut out);
        prop_assert_eq!(n, model.len());
        prop_assert_eq!(&out[..n], &model[..]);
        prop_assert!(buffer.is_empty());
    }
}

/// A strategy with `max_attempts = n` calling a body that always returns a
/// retryable error invokes that body exactly `n` times before giving up,
/// regardless of `n`. Runs as a plain `#[tokio::test]` (not inside the
/// `proptest!` macro) since the body under test is async.
#[tokio::test]
async fn retry_exhausts_exactly_max_attempts() {
    for max_attempts in [1u32, 2, 3, 5, 8] {
        let strategy = RetryStrategy {
            max_attempts,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            multiplier: 2.0,
            jitter_enabled: false,
        };
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &strategy,
            CancellationToken::new(),
            "proptest-retry",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), McpError>(McpError::Timeout("always times out".to_string())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
    }
}

/// A non-retryable error short-circuits on the first attempt, regardless of
/// how many attempts the strategy would otherwise allow.
#[tokio::test]
async fn retry_stops_immediately_on_non_retryable_error() {
    let strategy = RetryStrategy {
        max_attempts: 10,
        initial_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(5),
        multiplier: 2.0,
        jitter_enabled: false,
    };
    let calls = AtomicU32::new(0);
    let result = retry_with_backoff(
        &strategy,
        CancellationToken::new(),
        "proptest-retry-nonretryable",
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), McpError>(McpError::InvalidParams("bad input".to_string())) }
        },
    )
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
