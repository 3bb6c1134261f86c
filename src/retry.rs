//! Bounded retry for flaky async operations

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryOptions {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 50,
            delay: Duration::from_millis(100),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The predicate refused to retry this error
    #[error("{0}")]
    Aborted(E),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Aborted(err) => err,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, `should_retry` rejects an error, or the
/// attempts run out
pub async fn retry<T, E, F, Fut, P>(
    options: RetryOptions,
    should_retry: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = options.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !should_retry(&err) => return Err(RetryError::Aborted(err)),
            Err(err) if attempt >= attempts => {
                return Err(RetryError::Exhausted {
                    attempts,
                    last: err,
                })
            }
            Err(_) => {
                log::debug!("Attempt {}/{} failed, retrying in {:?}", attempt, attempts, options.delay);
                attempt += 1;
                tokio::time::sleep(options.delay).await;
            }
        }
    }
}
