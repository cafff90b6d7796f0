use std::future::Future;
use std::time::Duration;

use futures::future::{AbortRegistration, Abortable, Aborted};
use maybe_sync::MaybeSend;

use crate::error::GifwError;

/// Runs the future in the background on the tokio runtime.
pub fn spawn<T>(future: T) -> tokio::task::JoinHandle<T::Output>
where
    T: Future + MaybeSend + 'static,
    T::Output: MaybeSend + 'static,
{
    tokio::spawn(future)
}

/// Runs the future until it completes, is aborted through the handle paired with
/// `registration`, or `timeout` elapses.
pub async fn with_deadline<T>(
    future: impl Future<Output = Result<T, GifwError>>,
    registration: AbortRegistration,
    timeout: Duration,
) -> Result<T, GifwError> {
    match tokio::time::timeout(timeout, Abortable::new(future, registration)).await {
        Ok(Ok(result)) => result,
        Ok(Err(Aborted)) => Err(GifwError::Aborted),
        Err(_) => Err(GifwError::Timeout),
    }
}
