use std::future::Future;
use std::time::Duration;

use common::{Error, Result};

/// Run one exchange call with an upper bound on its duration.
pub(crate) async fn bounded<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}
