//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::{Error, Result};

/// Await `fut`, giving up after `limit` if one is set.
pub async fn with_timeout<F>(limit: Option<Duration>, fut: F) -> Result<F::Output>
where
    F: Future,
{
    match limit {
        Some(duration) => timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(duration)),
        None => Ok(fut.await),
    }
}

/// Whole milliseconds in `duration`, saturating.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
