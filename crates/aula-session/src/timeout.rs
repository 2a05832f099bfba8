//! Deadline wrapper for outbound provider calls.

use std::{future::Future, time::Duration};

use aula_core::Error;
use tokio::time::Instant;

/// Run `call` with a deadline of `after`.
///
/// On expiry the future is dropped (aborting the underlying request) and
/// [`Error::Timeout`] names `operation`. Provider errors are converted into
/// [`aula_core::Error`] unchanged.
pub async fn with_timeout<T, E, F>(
  operation: &'static str,
  after: Duration,
  call: F,
) -> Result<T, Error>
where
  F: Future<Output = Result<T, E>>,
  E: Into<Error>,
{
  let started = Instant::now();
  match tokio::time::timeout(after, call).await {
    Ok(Ok(value)) => {
      tracing::debug!(operation, elapsed = ?started.elapsed(), "provider call finished");
      Ok(value)
    }
    Ok(Err(e)) => {
      let e = e.into();
      tracing::debug!(operation, elapsed = ?started.elapsed(), error = %e, "provider call failed");
      Err(e)
    }
    Err(_) => {
      tracing::warn!(operation, ?after, "provider call timed out");
      Err(Error::Timeout { operation, after })
    }
  }
}
