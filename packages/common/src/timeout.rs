use std::future::Future;
use std::time::Duration;

use crate::error::ContentError;

/// Run a backend call under `limit`, mapping elapsed time to [`ContentError::Timeout`].
pub async fn bounded<T, E, F>(limit: Duration, fut: F) -> Result<T, ContentError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ContentError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ContentError::Timeout(limit)),
    }
}
